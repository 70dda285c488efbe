// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use kfbackend::auth::storage_provider_trait::AuthStorageProvider;
use kfbackend::auth::tokens::{AccessTokenRecord, RefreshTokenRecord};
use kfbackend::errors::StorageError;
use kftypes::identifiers::UserId;

/// Postgres implementation of the [`AuthStorageProvider`].
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: PgPool,
}

impl PostgresAuthStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthStorageProvider for PostgresAuthStorage {
    async fn load_access_token(
        &self,
        token: &str,
    ) -> Result<Option<AccessTokenRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT token, user_id, expires_at FROM access_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(AccessTokenRecord {
                token: row.try_get("token")?,
                user_id: UserId::from(row.try_get::<uuid::Uuid, _>("user_id")?),
                expires_at: row.try_get("expires_at")?,
            })
        })
        .transpose()
    }

    async fn load_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT token, user_id, expires_at, revoked FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(RefreshTokenRecord {
                token: row.try_get("token")?,
                user_id: UserId::from(row.try_get::<uuid::Uuid, _>("user_id")?),
                expires_at: row.try_get("expires_at")?,
                revoked: row.try_get("revoked")?,
            })
        })
        .transpose()
    }

    async fn store_token_pair(
        &self,
        access: AccessTokenRecord,
        refresh: RefreshTokenRecord,
    ) -> Result<(), StorageError> {
        let mut txn = self.pool.begin().await?;
        sqlx::query("INSERT INTO access_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&access.token)
            .bind(access.user_id.as_uuid())
            .bind(access.expires_at)
            .execute(txn.as_mut())
            .await?;
        sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, expires_at, revoked) \
            VALUES ($1, $2, $3, $4)",
        )
        .bind(&refresh.token)
        .bind(refresh.user_id.as_uuid())
        .bind(refresh.expires_at)
        .bind(refresh.revoked)
        .execute(txn.as_mut())
        .await?;
        txn.commit().await?;
        Ok(())
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

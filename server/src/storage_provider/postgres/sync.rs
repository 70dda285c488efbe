// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use kfbackend::errors::StorageError;
use kfbackend::sync::digest::{leaf_digest, LeafDigest};
use kfbackend::sync::errors::PushError;
use kfbackend::sync::records::{
    CredentialMetadataRecord, CryptoKeyRecord, PushBatch, SyncRecord, SyncState,
};
use kfbackend::sync::storage_provider_trait::{
    PushApplied, SyncStorageProvider, TombstoneOutcome,
};
use kftypes::identifiers::{UserId, ZoneId};
use kftypes::keys::{KeyClass, KeyType, KeyUsageFlags};

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres implementation of the [`SyncStorageProvider`]. Every mutation
/// runs in a transaction that first takes a row lock on the per-(user, zone)
/// `sync_state` row, which serializes concurrent pushes of the same user and
/// keeps the gencount allocation crash-safe.
#[derive(Debug, Clone)]
pub struct PostgresSyncStorage {
    pool: PgPool,
}

impl PostgresSyncStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_error(item_uuid: &str, error: sqlx::Error) -> PushError {
    match &error {
        sqlx::Error::Database(db_error)
            if db_error.code().as_deref() == Some(UNIQUE_VIOLATION) =>
        {
            PushError::Conflict(item_uuid.to_string())
        }
        _ => PushError::Storage(error.into()),
    }
}

fn usage_flags_from_row(row: &PgRow) -> Result<KeyUsageFlags, StorageError> {
    let bits: i16 = row.try_get("usage_flags")?;
    u8::try_from(bits)
        .ok()
        .and_then(KeyUsageFlags::from_bits)
        .ok_or_else(|| StorageError::Corrupt(format!("usage_flags out of range: {bits}")))
}

fn crypto_key_from_row(row: &PgRow) -> Result<CryptoKeyRecord, StorageError> {
    let key_class: String = row.try_get("key_class")?;
    let key_type: String = row.try_get("key_type")?;
    Ok(CryptoKeyRecord {
        item_uuid: row.try_get("item_uuid")?,
        key_class: key_class
            .parse::<KeyClass>()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?,
        key_type: key_type
            .parse::<KeyType>()
            .map_err(|e| StorageError::Corrupt(e.to_string()))?,
        label: row.try_get("label")?,
        application_label: row.try_get("application_label")?,
        data: row.try_get("key_data")?,
        access_group: row.try_get("access_group")?,
        usage_flags: usage_flags_from_row(row)?,
        gencount: row.try_get("gencount")?,
        tombstone: row.try_get("tombstone")?,
        created_at: row.try_get("created_at")?,
    })
}

fn credential_metadata_from_row(row: &PgRow) -> Result<CredentialMetadataRecord, StorageError> {
    let port: i32 = row.try_get("port")?;
    Ok(CredentialMetadataRecord {
        item_uuid: row.try_get("item_uuid")?,
        server: row.try_get("server")?,
        account: row.try_get("account")?,
        protocol: row.try_get("protocol")?,
        port: u16::try_from(port)
            .map_err(|_| StorageError::Corrupt(format!("port out of range: {port}")))?,
        path: row.try_get("path")?,
        label: row.try_get("label")?,
        access_group: row.try_get("access_group")?,
        password_key_uuid: row.try_get("password_key_uuid")?,
        metadata_key_uuid: row.try_get("metadata_key_uuid")?,
        gencount: row.try_get("gencount")?,
        tombstone: row.try_get("tombstone")?,
        created_at: row.try_get("created_at")?,
    })
}

fn sync_record_from_row(row: &PgRow) -> Result<SyncRecord, StorageError> {
    Ok(SyncRecord {
        item_uuid: row.try_get("item_uuid")?,
        parent_key_uuid: row.try_get("parent_key_uuid")?,
        wrapped_key: row.try_get("wrapped_key")?,
        enc_item: row.try_get("enc_item")?,
        enc_version: row.try_get("enc_version")?,
        context_id: row.try_get("context_id")?,
        gencount: row.try_get("gencount")?,
        tombstone: row.try_get("tombstone")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl SyncStorageProvider for PostgresSyncStorage {
    async fn sync_state(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
    ) -> Result<SyncState, StorageError> {
        let row = sqlx::query("SELECT gencount, digest FROM sync_state WHERE user_id = $1 AND zone = $2")
            .bind(user_id.as_uuid())
            .bind(zone.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(SyncState::default());
        };
        let digest: Vec<u8> = row.try_get("digest")?;
        Ok(SyncState {
            gencount: row.try_get("gencount")?,
            digest: LeafDigest::try_from(digest.as_slice())
                .map_err(|e| StorageError::Corrupt(e.to_string()))?,
        })
    }

    async fn list_crypto_keys(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<CryptoKeyRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT item_uuid, key_class, key_type, label, application_label, key_data, \
                access_group, usage_flags, gencount, tombstone, created_at \
            FROM crypto_keys \
            WHERE user_id = $1 AND zone = $2 AND gencount > $3 \
                AND (tombstone = FALSE OR $4) \
            ORDER BY gencount ASC",
        )
        .bind(user_id.as_uuid())
        .bind(zone.as_str())
        .bind(since_gencount)
        .bind(include_tombstoned)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(crypto_key_from_row).collect()
    }

    async fn list_credential_metadata(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<CredentialMetadataRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT item_uuid, server, account, protocol, port, path, label, access_group, \
                password_key_uuid, metadata_key_uuid, gencount, tombstone, created_at \
            FROM credential_metadata \
            WHERE user_id = $1 AND zone = $2 AND gencount > $3 \
                AND (tombstone = FALSE OR $4) \
            ORDER BY gencount ASC",
        )
        .bind(user_id.as_uuid())
        .bind(zone.as_str())
        .bind(since_gencount)
        .bind(include_tombstoned)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(credential_metadata_from_row).collect()
    }

    async fn list_sync_records(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<SyncRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT item_uuid, parent_key_uuid, wrapped_key, enc_item, enc_version, \
                context_id, gencount, tombstone, created_at \
            FROM sync_records \
            WHERE user_id = $1 AND zone = $2 AND gencount > $3 \
                AND (tombstone = FALSE OR $4) \
            ORDER BY gencount ASC",
        )
        .bind(user_id.as_uuid())
        .bind(zone.as_str())
        .bind(since_gencount)
        .bind(include_tombstoned)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(sync_record_from_row).collect()
    }

    async fn crypto_key_exists(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        item_uuid: &str,
    ) -> Result<bool, StorageError> {
        let row = sqlx::query(
            "SELECT EXISTS( \
                SELECT 1 FROM crypto_keys \
                WHERE user_id = $1 AND zone = $2 AND item_uuid = $3)",
        )
        .bind(user_id.as_uuid())
        .bind(zone.as_str())
        .bind(item_uuid)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get(0)?)
    }

    async fn apply_push(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        batch: PushBatch,
    ) -> Result<PushApplied, PushError> {
        let mut txn = self.pool.begin().await.map_err(StorageError::from)?;

        // Pin the sync-state row; concurrent pushes of the same (user, zone)
        // serialize here.
        let state_row =
            sqlx::query("SELECT gencount FROM sync_state WHERE user_id = $1 AND zone = $2 FOR UPDATE")
                .bind(user_id.as_uuid())
                .bind(zone.as_str())
                .fetch_optional(txn.as_mut())
                .await
                .map_err(StorageError::from)?;
        let mut gencount: i64 = state_row
            .map(|row| row.try_get(0))
            .transpose()
            .map_err(StorageError::from)?
            .unwrap_or(0);
        let processed = batch.len();

        for key in &batch.keys {
            gencount += 1;
            sqlx::query(
                "INSERT INTO crypto_keys (user_id, item_uuid, zone, key_class, key_type, \
                    label, application_label, key_data, access_group, usage_flags, \
                    gencount, tombstone) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                ON CONFLICT (user_id, item_uuid, zone) DO UPDATE SET \
                    key_class = EXCLUDED.key_class, \
                    key_type = EXCLUDED.key_type, \
                    label = EXCLUDED.label, \
                    application_label = EXCLUDED.application_label, \
                    key_data = EXCLUDED.key_data, \
                    access_group = EXCLUDED.access_group, \
                    usage_flags = EXCLUDED.usage_flags, \
                    gencount = EXCLUDED.gencount, \
                    tombstone = EXCLUDED.tombstone",
            )
            .bind(user_id.as_uuid())
            .bind(&key.item_uuid)
            .bind(zone.as_str())
            .bind(key.key_class.as_str())
            .bind(key.key_type.as_str())
            .bind(&key.label)
            .bind(&key.application_label)
            .bind(&key.data)
            .bind(&key.access_group)
            .bind(key.usage_flags.bits() as i16)
            .bind(gencount)
            .bind(key.tombstone)
            .execute(txn.as_mut())
            .await
            .map_err(|error| push_error(&key.item_uuid, error))?;
        }

        for metadata in &batch.metadata {
            gencount += 1;
            sqlx::query(
                "INSERT INTO credential_metadata (user_id, item_uuid, zone, server, account, \
                    protocol, port, path, label, access_group, password_key_uuid, \
                    metadata_key_uuid, gencount, tombstone) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
                ON CONFLICT (user_id, item_uuid, zone) DO UPDATE SET \
                    server = EXCLUDED.server, \
                    account = EXCLUDED.account, \
                    protocol = EXCLUDED.protocol, \
                    port = EXCLUDED.port, \
                    path = EXCLUDED.path, \
                    label = EXCLUDED.label, \
                    access_group = EXCLUDED.access_group, \
                    password_key_uuid = EXCLUDED.password_key_uuid, \
                    metadata_key_uuid = EXCLUDED.metadata_key_uuid, \
                    gencount = EXCLUDED.gencount, \
                    tombstone = EXCLUDED.tombstone",
            )
            .bind(user_id.as_uuid())
            .bind(&metadata.item_uuid)
            .bind(zone.as_str())
            .bind(&metadata.server)
            .bind(&metadata.account)
            .bind(&metadata.protocol)
            .bind(metadata.port as i32)
            .bind(&metadata.path)
            .bind(&metadata.label)
            .bind(&metadata.access_group)
            .bind(&metadata.password_key_uuid)
            .bind(&metadata.metadata_key_uuid)
            .bind(gencount)
            .bind(metadata.tombstone)
            .execute(txn.as_mut())
            .await
            .map_err(|error| push_error(&metadata.item_uuid, error))?;
        }

        for record in &batch.sync_records {
            gencount += 1;
            sqlx::query(
                "INSERT INTO sync_records (user_id, item_uuid, zone, parent_key_uuid, \
                    wrapped_key, enc_item, enc_version, context_id, gencount, tombstone) \
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                ON CONFLICT (user_id, item_uuid, zone) DO UPDATE SET \
                    parent_key_uuid = EXCLUDED.parent_key_uuid, \
                    wrapped_key = EXCLUDED.wrapped_key, \
                    enc_item = EXCLUDED.enc_item, \
                    enc_version = EXCLUDED.enc_version, \
                    context_id = EXCLUDED.context_id, \
                    gencount = EXCLUDED.gencount, \
                    tombstone = EXCLUDED.tombstone",
            )
            .bind(user_id.as_uuid())
            .bind(&record.item_uuid)
            .bind(zone.as_str())
            .bind(&record.parent_key_uuid)
            .bind(&record.wrapped_key)
            .bind(&record.enc_item)
            .bind(record.enc_version)
            .bind(&record.context_id)
            .bind(gencount)
            .bind(record.tombstone)
            .execute(txn.as_mut())
            .await
            .map_err(|error| push_error(&record.item_uuid, error))?;
        }

        // Refresh the digest from the post-upsert alive leaf set, still
        // inside the transaction.
        let leaf_rows = sqlx::query(
            "SELECT item_uuid FROM sync_records \
            WHERE user_id = $1 AND zone = $2 AND tombstone = FALSE",
        )
        .bind(user_id.as_uuid())
        .bind(zone.as_str())
        .fetch_all(txn.as_mut())
        .await
        .map_err(StorageError::from)?;
        let leaf_ids: Vec<String> = leaf_rows
            .iter()
            .map(|row| row.try_get(0))
            .collect::<Result<_, _>>()
            .map_err(StorageError::from)?;
        let digest = leaf_digest(leaf_ids.iter().map(String::as_str));

        sqlx::query(
            "INSERT INTO sync_state (user_id, zone, gencount, digest) \
            VALUES ($1, $2, $3, $4) \
            ON CONFLICT (user_id, zone) DO UPDATE SET \
                gencount = EXCLUDED.gencount, \
                digest = EXCLUDED.digest, \
                updated_at = now()",
        )
        .bind(user_id.as_uuid())
        .bind(zone.as_str())
        .bind(gencount)
        .bind(digest.as_bytes().as_slice())
        .execute(txn.as_mut())
        .await
        .map_err(StorageError::from)?;

        txn.commit().await.map_err(StorageError::from)?;

        Ok(PushApplied {
            gencount,
            digest,
            processed,
        })
    }

    async fn tombstone_all(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
    ) -> Result<TombstoneOutcome, StorageError> {
        let mut txn = self.pool.begin().await?;

        let state_row =
            sqlx::query("SELECT gencount FROM sync_state WHERE user_id = $1 AND zone = $2 FOR UPDATE")
                .bind(user_id.as_uuid())
                .bind(zone.as_str())
                .fetch_optional(txn.as_mut())
                .await?;
        let mut gencount: i64 = state_row.map(|row| row.try_get(0)).transpose()?.unwrap_or(0);
        let mut deleted = 0u64;

        // Layers in allocation order; within a layer, stored gencount order.
        for table in ["crypto_keys", "credential_metadata", "sync_records"] {
            let rows = sqlx::query(&format!(
                "SELECT item_uuid FROM {table} \
                WHERE user_id = $1 AND zone = $2 AND tombstone = FALSE \
                ORDER BY gencount ASC"
            ))
            .bind(user_id.as_uuid())
            .bind(zone.as_str())
            .fetch_all(txn.as_mut())
            .await?;
            for row in rows {
                let item_uuid: String = row.try_get(0)?;
                gencount += 1;
                sqlx::query(&format!(
                    "UPDATE {table} SET tombstone = TRUE, gencount = $4 \
                    WHERE user_id = $1 AND zone = $2 AND item_uuid = $3"
                ))
                .bind(user_id.as_uuid())
                .bind(zone.as_str())
                .bind(&item_uuid)
                .bind(gencount)
                .execute(txn.as_mut())
                .await?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            sqlx::query(
                "INSERT INTO sync_state (user_id, zone, gencount, digest) \
                VALUES ($1, $2, $3, $4) \
                ON CONFLICT (user_id, zone) DO UPDATE SET \
                    gencount = EXCLUDED.gencount, \
                    digest = EXCLUDED.digest, \
                    updated_at = now()",
            )
            .bind(user_id.as_uuid())
            .bind(zone.as_str())
            .bind(gencount)
            .bind(LeafDigest::empty().as_bytes().as_slice())
            .execute(txn.as_mut())
            .await?;
        }

        txn.commit().await?;

        Ok(TombstoneOutcome { deleted, gencount })
    }
}

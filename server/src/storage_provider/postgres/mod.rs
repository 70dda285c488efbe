// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Postgres-backed storage providers.

pub mod auth;
pub mod sync;

pub use auth::PostgresAuthStorage;
pub use sync::PostgresSyncStorage;

use kfbackend::errors::StorageError;
use kfbackend::settings::DatabaseSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to the configured database and run the embedded migrations.
pub async fn connect_to_database(settings: &DatabaseSettings) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&settings.connection_string())
        .await
        .map_err(StorageError::from)?;
    sqlx::migrate!("./migrations").run(&pool).await.map_err(|error| {
        StorageError::from(Box::new(error) as Box<dyn std::error::Error + Send + Sync>)
    })?;
    Ok(pool)
}

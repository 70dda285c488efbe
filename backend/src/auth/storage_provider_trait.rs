// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt::Debug;

use async_trait::async_trait;

use super::tokens::{AccessTokenRecord, RefreshTokenRecord};
use crate::errors::StorageError;

/// Storage provider trait for the identity adapter.
#[async_trait]
pub trait AuthStorageProvider: Sync + Send + Debug + 'static {
    /// Loads an access token record, or `None` if the token is unknown.
    async fn load_access_token(
        &self,
        token: &str,
    ) -> Result<Option<AccessTokenRecord>, StorageError>;

    /// Loads a refresh token record, or `None` if the token is unknown.
    async fn load_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StorageError>;

    /// Stores a freshly issued token pair.
    async fn store_token_pair(
        &self,
        access: AccessTokenRecord,
        refresh: RefreshTokenRecord,
    ) -> Result<(), StorageError>;

    /// Marks a refresh token revoked. Idempotent.
    async fn revoke_refresh_token(&self, token: &str) -> Result<(), StorageError>;
}

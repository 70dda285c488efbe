// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use kfbackend::auth::storage_provider_trait::AuthStorageProvider;
use kfbackend::auth::tokens::{AccessTokenRecord, RefreshTokenRecord};
use kfbackend::errors::StorageError;

fn lock_poisoned() -> StorageError {
    StorageError::from(Box::<dyn std::error::Error + Send + Sync>::from(
        "storage lock poisoned",
    ))
}

/// A thread-safe, in-memory implementation of an [`AuthStorageProvider`].
#[derive(Debug, Default)]
pub struct MemoryAuthStorage {
    access_tokens: RwLock<HashMap<String, AccessTokenRecord>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
}

impl MemoryAuthStorage {
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl AuthStorageProvider for MemoryAuthStorage {
    async fn load_access_token(
        &self,
        token: &str,
    ) -> Result<Option<AccessTokenRecord>, StorageError> {
        let access_tokens = self.access_tokens.read().map_err(|_| lock_poisoned())?;
        Ok(access_tokens.get(token).cloned())
    }

    async fn load_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, StorageError> {
        let refresh_tokens = self.refresh_tokens.read().map_err(|_| lock_poisoned())?;
        Ok(refresh_tokens.get(token).cloned())
    }

    async fn store_token_pair(
        &self,
        access: AccessTokenRecord,
        refresh: RefreshTokenRecord,
    ) -> Result<(), StorageError> {
        let mut access_tokens = self.access_tokens.write().map_err(|_| lock_poisoned())?;
        let mut refresh_tokens = self.refresh_tokens.write().map_err(|_| lock_poisoned())?;
        access_tokens.insert(access.token.clone(), access);
        refresh_tokens.insert(refresh.token.clone(), refresh);
        Ok(())
    }

    async fn revoke_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        let mut refresh_tokens = self.refresh_tokens.write().map_err(|_| lock_poisoned())?;
        if let Some(record) = refresh_tokens.get_mut(token) {
            record.revoked = true;
        }
        Ok(())
    }
}

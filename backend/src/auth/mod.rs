// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Identity adapter: verifies bearer credentials and rotates refresh
//! tokens. Sign-up and login are external collaborators; the sync core only
//! ever consumes the verified [`UserId`] this module produces.

use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use kftypes::identifiers::UserId;

use self::storage_provider_trait::AuthStorageProvider;
use self::tokens::{generate_token, AccessTokenRecord, RefreshTokenRecord, TokenPair};
use crate::errors::StorageError;
use crate::settings::AuthSettings;

pub mod storage_provider_trait;
pub mod tokens;

/// Errors surfaced by credential verification and refresh. Unknown, expired
/// and revoked credentials are indistinguishable to the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credential")]
    Unauthenticated,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Verifies access tokens and rotates refresh tokens against an
/// [`AuthStorageProvider`].
#[derive(Debug)]
pub struct AuthProvider<A> {
    storage: Arc<A>,
    access_token_lifetime: Duration,
    refresh_token_lifetime: Duration,
}

impl<A> Clone for AuthProvider<A> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            access_token_lifetime: self.access_token_lifetime,
            refresh_token_lifetime: self.refresh_token_lifetime,
        }
    }
}

impl<A: AuthStorageProvider> AuthProvider<A> {
    pub fn new(storage: Arc<A>, settings: &AuthSettings) -> Self {
        Self {
            storage,
            access_token_lifetime: Duration::seconds(settings.access_token_lifetime_secs as i64),
            refresh_token_lifetime: Duration::seconds(settings.refresh_token_lifetime_secs as i64),
        }
    }

    /// Verifies a caller's bearer credential and yields the stable user id.
    pub async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let record = self
            .storage
            .load_access_token(token)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if record.expires_at <= Utc::now() {
            return Err(AuthError::Unauthenticated);
        }
        Ok(record.user_id)
    }

    /// Rotates a refresh token into a fresh pair. The presented token is
    /// marked revoked before the new pair is issued; a replayed token fails
    /// verification.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let record = self
            .storage
            .load_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if record.revoked || record.expires_at <= Utc::now() {
            return Err(AuthError::Unauthenticated);
        }
        self.storage.revoke_refresh_token(refresh_token).await?;
        self.issue_token_pair(&record.user_id).await
    }

    /// Issues a fresh token pair for a verified user. Consumed by operator
    /// tooling and the test harness; the sync surface itself never mints.
    pub async fn issue_token_pair(&self, user_id: &UserId) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access = AccessTokenRecord {
            token: generate_token(),
            user_id: *user_id,
            expires_at: now + self.access_token_lifetime,
        };
        let refresh = RefreshTokenRecord {
            token: generate_token(),
            user_id: *user_id,
            expires_at: now + self.refresh_token_lifetime,
            revoked: false,
        };
        let pair = TokenPair {
            access_token: access.token.clone(),
            refresh_token: refresh.token.clone(),
            access_expires_at: access.expires_at,
        };
        self.storage.store_token_pair(access, refresh).await?;
        Ok(pair)
    }
}

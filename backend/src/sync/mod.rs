// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! This module contains the multi-tenant sync engine. It orders the writes
//! of all devices of one user, summarizes vault state for cheap divergence
//! checks and serves delta pulls, without ever being able to decrypt the
//! synchronized items.
//!
//! # Overview
//!
//! Every user owns a vault of opaque encrypted credentials, decomposed into
//! three layers sharing an `item_uuid`: key records, searchable metadata and
//! the encrypted payloads. Per (user, zone) the engine maintains a strictly
//! monotonic generation counter and a digest over the alive Layer-3 set.
//!
//! * **Manifest** reads the (gencount, digest) pair; clients with an equal
//!   digest skip the pull body.
//! * **Pull** returns all records above a client-supplied gencount, in
//!   ascending order, with tombstones filtered by default.
//! * **Push** validates parent-key references, allocates gencounts inside
//!   the storage transaction, upserts last-write-wins by `item_uuid`,
//!   refreshes the digest and fans a change hint out to the user's live
//!   connections.
//! * **Delete-all** tombstones every record of a zone; deletion is an
//!   append, not a remove, so peers learn of it through ordinary pulls.
//!
//! Writes of the same (user, zone) serialize at the storage transaction
//! boundary; there is no ambient per-user lock and no process-wide counter.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use kftypes::identifiers::{UserId, ZoneId};
use kftypes::messages::sync::LiveEvent;

use self::digest::LeafDigest;
use self::errors::{DeleteError, ManifestError, PullError, PushError};
use self::records::{CredentialMetadataRecord, CryptoKeyRecord, PushBatch, SyncRecord};
use self::storage_provider_trait::SyncStorageProvider;

pub mod digest;
pub mod errors;
pub mod records;
pub mod storage_provider_trait;

/// Summary of a (user, zone) at a point in time.
#[derive(Clone, Debug)]
pub struct Manifest {
    pub zone: ZoneId,
    pub gencount: i64,
    pub digest: LeafDigest,
}

/// Result of a delta pull.
#[derive(Clone, Debug)]
pub struct PullOutcome {
    pub keys: Vec<CryptoKeyRecord>,
    pub metadata: Vec<CredentialMetadataRecord>,
    pub sync_records: Vec<SyncRecord>,
    pub gencount: i64,
}

/// Result of a committed push.
#[derive(Clone, Copy, Debug)]
pub struct PushOutcome {
    pub gencount: i64,
    pub digest: LeafDigest,
    pub processed: usize,
}

/// Result of a bulk delete.
#[derive(Clone, Copy, Debug)]
pub struct DeleteOutcome {
    pub deleted: u64,
    pub gencount: i64,
}

/// Change notification handed to the live hub after a committed mutation.
#[derive(Clone, Debug)]
pub struct CredentialsChanged {
    pub user_id: UserId,
    pub zone: ZoneId,
    pub gencount: i64,
    pub timestamp: i64,
}

impl CredentialsChanged {
    fn new(user_id: UserId, zone: ZoneId, gencount: i64) -> Self {
        Self {
            user_id,
            zone,
            gencount,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

impl From<CredentialsChanged> for LiveEvent {
    fn from(event: CredentialsChanged) -> Self {
        LiveEvent::CredentialsChanged {
            user_id: event.user_id,
            zone: event.zone,
            gencount: event.gencount,
            timestamp: event.timestamp,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum NotifierError {
    /// No live connection of this user accepted the event.
    #[error("no live connection for this user")]
    ClientNotFound,
    /// The dispatcher did not answer.
    #[error("dispatcher unavailable")]
    DispatcherUnavailable,
}

/// Seam towards the live broadcast hub. Delivery is at-most-once and best
/// effort; the gencount + digest pull path stays authoritative.
#[async_trait]
pub trait SyncNotifier: Sync + Send + 'static {
    async fn notify(&self, event: CredentialsChanged) -> Result<(), NotifierError>;
}

/// The sync engine. Stateless; every operation runs against a
/// [`SyncStorageProvider`] and serializes per (user, zone) at the storage
/// transaction boundary.
pub struct SyncEngine;

impl SyncEngine {
    /// Pure read of the sync state. An untouched zone yields gencount 0 and
    /// the empty-set digest.
    #[tracing::instrument(name = "Read manifest", skip_all)]
    pub async fn manifest<S: SyncStorageProvider>(
        storage: &S,
        user_id: &UserId,
        zone: &ZoneId,
    ) -> Result<Manifest, ManifestError> {
        let state = storage.sync_state(user_id, zone).await?;
        Ok(Manifest {
            zone: zone.clone(),
            gencount: state.gencount,
            digest: state.digest,
        })
    }

    /// Returns all records with `gencount > since_gencount` per layer,
    /// ascending, plus the current gencount for the client's next delta.
    #[tracing::instrument(name = "Assemble delta pull", skip_all)]
    pub async fn pull<S: SyncStorageProvider>(
        storage: &S,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<PullOutcome, PullError> {
        let keys = storage
            .list_crypto_keys(user_id, zone, since_gencount, include_tombstoned)
            .await?;
        let metadata = storage
            .list_credential_metadata(user_id, zone, since_gencount, include_tombstoned)
            .await?;
        let sync_records = storage
            .list_sync_records(user_id, zone, since_gencount, include_tombstoned)
            .await?;
        let state = storage.sync_state(user_id, zone).await?;
        Ok(PullOutcome {
            keys,
            metadata,
            sync_records,
            gencount: state.gencount,
        })
    }

    /// Applies one batch atomically and broadcasts a change hint on success.
    ///
    /// An empty batch allocates nothing and answers the current manifest.
    #[tracing::instrument(name = "Process push", skip_all, fields(records = batch.len()))]
    pub async fn push<S: SyncStorageProvider, N: SyncNotifier>(
        storage: &S,
        notifier: &N,
        user_id: &UserId,
        zone: &ZoneId,
        batch: PushBatch,
    ) -> Result<PushOutcome, PushError> {
        Self::verify_references(storage, user_id, zone, &batch).await?;

        if batch.is_empty() {
            let state = storage.sync_state(user_id, zone).await?;
            return Ok(PushOutcome {
                gencount: state.gencount,
                digest: state.digest,
                processed: 0,
            });
        }

        let applied = storage.apply_push(user_id, zone, batch).await?;

        let event = CredentialsChanged::new(*user_id, zone.clone(), applied.gencount);
        if let Err(error) = notifier.notify(event).await {
            // Best effort: a dropped hint is recovered by the next pull.
            tracing::debug!(%error, "change notification not delivered");
        }

        Ok(PushOutcome {
            gencount: applied.gencount,
            digest: applied.digest,
            processed: applied.processed,
        })
    }

    /// Tombstones every alive record of the zone and broadcasts once.
    #[tracing::instrument(name = "Process bulk delete", skip_all)]
    pub async fn delete_all<S: SyncStorageProvider, N: SyncNotifier>(
        storage: &S,
        notifier: &N,
        user_id: &UserId,
        zone: &ZoneId,
    ) -> Result<DeleteOutcome, DeleteError> {
        let outcome = storage.tombstone_all(user_id, zone).await?;

        if outcome.deleted > 0 {
            let event = CredentialsChanged::new(*user_id, zone.clone(), outcome.gencount);
            if let Err(error) = notifier.notify(event).await {
                tracing::debug!(%error, "change notification not delivered");
            }
        }

        Ok(DeleteOutcome {
            deleted: outcome.deleted,
            gencount: outcome.gencount,
        })
    }

    /// Every `password_key_uuid` and `parent_key_uuid` must resolve to a
    /// Layer-1 record that is stored for this (user, zone) or present in
    /// the batch's keys array. Records are never physically removed, so an
    /// existence check outside the push transaction cannot go stale.
    async fn verify_references<S: SyncStorageProvider>(
        storage: &S,
        user_id: &UserId,
        zone: &ZoneId,
        batch: &PushBatch,
    ) -> Result<(), PushError> {
        let batch_keys: HashSet<&str> =
            batch.keys.iter().map(|key| key.item_uuid.as_str()).collect();
        let mut verified: HashSet<&str> = HashSet::new();

        let references = batch
            .metadata
            .iter()
            .map(|metadata| metadata.password_key_uuid.as_str())
            .chain(
                batch
                    .sync_records
                    .iter()
                    .map(|record| record.parent_key_uuid.as_str()),
            );
        for reference in references {
            if batch_keys.contains(reference) || verified.contains(reference) {
                continue;
            }
            if !storage.crypto_key_exists(user_id, zone, reference).await? {
                return Err(PushError::InvalidReference(reference.to_string()));
            }
            verified.insert(reference);
        }
        Ok(())
    }
}

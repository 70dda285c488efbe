// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt::Debug;

use async_trait::async_trait;

use kftypes::identifiers::{UserId, ZoneId};

use super::digest::LeafDigest;
use super::errors::PushError;
use super::records::{
    CredentialMetadataRecord, CryptoKeyRecord, PushBatch, SyncRecord, SyncState,
};
use crate::errors::StorageError;

/// Result of a committed push transaction.
#[derive(Clone, Copy, Debug)]
pub struct PushApplied {
    /// Highest gencount after the batch, now recorded in the sync state.
    pub gencount: i64,
    /// Digest of the post-commit alive leaf set.
    pub digest: LeafDigest,
    /// Number of upserted records across all three layers.
    pub processed: usize,
}

/// Result of a committed bulk tombstone.
#[derive(Clone, Copy, Debug)]
pub struct TombstoneOutcome {
    /// Number of records flipped to tombstoned.
    pub deleted: u64,
    /// Gencount after the operation; advanced once per flipped record.
    pub gencount: i64,
}

/// Storage provider trait for the sync engine.
///
/// All state is scoped by (user, zone); implementations must never let one
/// user's operation observe another user's rows. The gencount allocator has
/// no state of its own: the authoritative counter is the sync-state row,
/// which `apply_push` and `tombstone_all` read, advance and write inside a
/// single transaction.
#[async_trait]
pub trait SyncStorageProvider: Sync + Send + Debug + 'static {
    /// Current sync state, or the zero state (gencount 0, empty-set digest)
    /// if the zone has never been written.
    async fn sync_state(&self, user_id: &UserId, zone: &ZoneId)
        -> Result<SyncState, StorageError>;

    /// Layer-1 records with `gencount > since_gencount`, ascending.
    /// Tombstoned rows are filtered unless `include_tombstoned` is set.
    async fn list_crypto_keys(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<CryptoKeyRecord>, StorageError>;

    /// Layer-2 records, same contract as [`Self::list_crypto_keys`].
    async fn list_credential_metadata(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<CredentialMetadataRecord>, StorageError>;

    /// Layer-3 records, same contract as [`Self::list_crypto_keys`].
    async fn list_sync_records(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<SyncRecord>, StorageError>;

    /// Whether a Layer-1 row with this `item_uuid` is stored for the
    /// (user, zone). Tombstoned rows count: they are still stored.
    async fn crypto_key_exists(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        item_uuid: &str,
    ) -> Result<bool, StorageError>;

    /// Applies one validated batch in a single transaction: allocates
    /// gencounts `G+1 ..= G+n` in the order keys, metadata, sync records
    /// (input order preserved within each array), upserts every record
    /// keyed by (user, item_uuid, zone) while preserving `created_at`,
    /// recomputes the alive-leaf digest and writes the new sync state.
    ///
    /// Partial failure must leave the store unchanged.
    async fn apply_push(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        batch: PushBatch,
    ) -> Result<PushApplied, PushError>;

    /// Flips every alive record of the (user, zone) to tombstoned in a
    /// single transaction, advancing the gencount once per record, and
    /// writes the empty-set digest.
    async fn tombstone_all(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
    ) -> Result<TombstoneOutcome, StorageError>;
}

// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

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

fn lock_poisoned() -> StorageError {
    StorageError::from(Box::<dyn std::error::Error + Send + Sync>::from(
        "storage lock poisoned",
    ))
}

#[derive(Debug, Default)]
struct ZoneData {
    keys: HashMap<String, CryptoKeyRecord>,
    metadata: HashMap<String, CredentialMetadataRecord>,
    records: HashMap<String, SyncRecord>,
    state: SyncState,
}

impl ZoneData {
    fn recompute_digest(&mut self) {
        self.state.digest = leaf_digest(
            self.records
                .values()
                .filter(|record| !record.tombstone)
                .map(|record| record.item_uuid.as_str()),
        );
    }
}

/// A thread-safe, in-memory implementation of a [`SyncStorageProvider`]
/// based on [`HashMap`]s. The store-wide write lock makes every push and
/// bulk delete atomic, which matches the transactional contract of the
/// trait.
#[derive(Debug, Default)]
pub struct MemorySyncStorage {
    zones: RwLock<HashMap<(UserId, ZoneId), ZoneData>>,
}

impl MemorySyncStorage {
    pub fn new() -> Self {
        Default::default()
    }
}

#[async_trait]
impl SyncStorageProvider for MemorySyncStorage {
    async fn sync_state(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
    ) -> Result<SyncState, StorageError> {
        let zones = self.zones.read().map_err(|_| lock_poisoned())?;
        Ok(zones
            .get(&(*user_id, zone.clone()))
            .map(|data| data.state)
            .unwrap_or_default())
    }

    async fn list_crypto_keys(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<CryptoKeyRecord>, StorageError> {
        let zones = self.zones.read().map_err(|_| lock_poisoned())?;
        let Some(data) = zones.get(&(*user_id, zone.clone())) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<_> = data
            .keys
            .values()
            .filter(|record| {
                record.gencount > since_gencount && (include_tombstoned || !record.tombstone)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|record| record.gencount);
        Ok(rows)
    }

    async fn list_credential_metadata(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<CredentialMetadataRecord>, StorageError> {
        let zones = self.zones.read().map_err(|_| lock_poisoned())?;
        let Some(data) = zones.get(&(*user_id, zone.clone())) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<_> = data
            .metadata
            .values()
            .filter(|record| {
                record.gencount > since_gencount && (include_tombstoned || !record.tombstone)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|record| record.gencount);
        Ok(rows)
    }

    async fn list_sync_records(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        since_gencount: i64,
        include_tombstoned: bool,
    ) -> Result<Vec<SyncRecord>, StorageError> {
        let zones = self.zones.read().map_err(|_| lock_poisoned())?;
        let Some(data) = zones.get(&(*user_id, zone.clone())) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<_> = data
            .records
            .values()
            .filter(|record| {
                record.gencount > since_gencount && (include_tombstoned || !record.tombstone)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|record| record.gencount);
        Ok(rows)
    }

    async fn crypto_key_exists(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        item_uuid: &str,
    ) -> Result<bool, StorageError> {
        let zones = self.zones.read().map_err(|_| lock_poisoned())?;
        Ok(zones
            .get(&(*user_id, zone.clone()))
            .is_some_and(|data| data.keys.contains_key(item_uuid)))
    }

    async fn apply_push(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
        batch: PushBatch,
    ) -> Result<PushApplied, PushError> {
        let mut zones = self
            .zones
            .write()
            .map_err(|_| PushError::Storage(lock_poisoned()))?;
        let data = zones.entry((*user_id, zone.clone())).or_default();

        let mut gencount = data.state.gencount;
        let now = Utc::now();
        let processed = batch.len();

        for key in batch.keys {
            gencount += 1;
            let created_at = data
                .keys
                .get(&key.item_uuid)
                .map(|existing| existing.created_at)
                .unwrap_or(now);
            let record = key.into_record(gencount, created_at);
            data.keys.insert(record.item_uuid.clone(), record);
        }
        for metadata in batch.metadata {
            gencount += 1;
            let created_at = data
                .metadata
                .get(&metadata.item_uuid)
                .map(|existing| existing.created_at)
                .unwrap_or(now);
            let record = metadata.into_record(gencount, created_at);
            data.metadata.insert(record.item_uuid.clone(), record);
        }
        for sync_record in batch.sync_records {
            gencount += 1;
            let created_at = data
                .records
                .get(&sync_record.item_uuid)
                .map(|existing| existing.created_at)
                .unwrap_or(now);
            let record = sync_record.into_record(gencount, created_at);
            data.records.insert(record.item_uuid.clone(), record);
        }

        data.state.gencount = gencount;
        data.recompute_digest();

        Ok(PushApplied {
            gencount,
            digest: data.state.digest,
            processed,
        })
    }

    async fn tombstone_all(
        &self,
        user_id: &UserId,
        zone: &ZoneId,
    ) -> Result<TombstoneOutcome, StorageError> {
        let mut zones = self.zones.write().map_err(|_| lock_poisoned())?;
        let Some(data) = zones.get_mut(&(*user_id, zone.clone())) else {
            return Ok(TombstoneOutcome {
                deleted: 0,
                gencount: 0,
            });
        };

        let mut gencount = data.state.gencount;
        let mut deleted = 0u64;

        // Layers in allocation order; within a layer, stored gencount order.
        let mut alive_keys: Vec<_> = data
            .keys
            .values()
            .filter(|record| !record.tombstone)
            .map(|record| (record.gencount, record.item_uuid.clone()))
            .collect();
        alive_keys.sort_unstable();
        for (_, item_uuid) in alive_keys {
            if let Some(record) = data.keys.get_mut(&item_uuid) {
                gencount += 1;
                record.tombstone = true;
                record.gencount = gencount;
                deleted += 1;
            }
        }

        let mut alive_metadata: Vec<_> = data
            .metadata
            .values()
            .filter(|record| !record.tombstone)
            .map(|record| (record.gencount, record.item_uuid.clone()))
            .collect();
        alive_metadata.sort_unstable();
        for (_, item_uuid) in alive_metadata {
            if let Some(record) = data.metadata.get_mut(&item_uuid) {
                gencount += 1;
                record.tombstone = true;
                record.gencount = gencount;
                deleted += 1;
            }
        }

        let mut alive_records: Vec<_> = data
            .records
            .values()
            .filter(|record| !record.tombstone)
            .map(|record| (record.gencount, record.item_uuid.clone()))
            .collect();
        alive_records.sort_unstable();
        for (_, item_uuid) in alive_records {
            if let Some(record) = data.records.get_mut(&item_uuid) {
                gencount += 1;
                record.tombstone = true;
                record.gencount = gencount;
                deleted += 1;
            }
        }

        if deleted > 0 {
            data.state.gencount = gencount;
            data.state.digest = LeafDigest::empty();
        }

        Ok(TombstoneOutcome { deleted, gencount })
    }
}

#[cfg(test)]
mod tests {
    use kfbackend::sync::records::{CryptoKeyUpsert, SyncRecordUpsert};
    use kftypes::keys::{KeyClass, KeyType, KeyUsage};

    use super::*;

    fn key_upsert(item_uuid: &str) -> CryptoKeyUpsert {
        CryptoKeyUpsert {
            item_uuid: item_uuid.to_string(),
            key_class: KeyClass::Symmetric,
            key_type: KeyType::AesGcm256,
            label: None,
            application_label: None,
            data: vec![0xaa; 32],
            access_group: "default".to_string(),
            usage_flags: [KeyUsage::Wrap, KeyUsage::Unwrap].into_iter().collect(),
            tombstone: false,
        }
    }

    fn record_upsert(item_uuid: &str, parent: &str) -> SyncRecordUpsert {
        SyncRecordUpsert {
            item_uuid: item_uuid.to_string(),
            parent_key_uuid: parent.to_string(),
            wrapped_key: vec![1; 48],
            enc_item: vec![2; 128],
            enc_version: 1,
            context_id: "default".to_string(),
            tombstone: false,
        }
    }

    #[tokio::test]
    async fn gencounts_are_allocated_across_layers_in_order() {
        let storage = MemorySyncStorage::new();
        let user = UserId::random();
        let zone = ZoneId::default();

        let applied = storage
            .apply_push(
                &user,
                &zone,
                PushBatch {
                    keys: vec![key_upsert("k1"), key_upsert("k2")],
                    metadata: Vec::new(),
                    sync_records: vec![record_upsert("r1", "k1")],
                },
            )
            .await
            .unwrap();
        assert_eq!(applied.gencount, 3);
        assert_eq!(applied.processed, 3);

        let keys = storage.list_crypto_keys(&user, &zone, 0, false).await.unwrap();
        assert_eq!(
            keys.iter().map(|k| k.gencount).collect::<Vec<_>>(),
            vec![1, 2]
        );
        let records = storage.list_sync_records(&user, &zone, 0, false).await.unwrap();
        assert_eq!(records[0].gencount, 3);
    }

    #[tokio::test]
    async fn upsert_preserves_created_at_and_advances_gencount() {
        let storage = MemorySyncStorage::new();
        let user = UserId::random();
        let zone = ZoneId::default();

        storage
            .apply_push(
                &user,
                &zone,
                PushBatch {
                    keys: vec![key_upsert("k1")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let first = storage.list_crypto_keys(&user, &zone, 0, false).await.unwrap();

        storage
            .apply_push(
                &user,
                &zone,
                PushBatch {
                    keys: vec![key_upsert("k1")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let second = storage.list_crypto_keys(&user, &zone, 0, false).await.unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].gencount, 2);
        assert_eq!(second[0].created_at, first[0].created_at);
    }

    #[tokio::test]
    async fn digest_tracks_the_alive_leaf_set() {
        let storage = MemorySyncStorage::new();
        let user = UserId::random();
        let zone = ZoneId::default();

        let applied = storage
            .apply_push(
                &user,
                &zone,
                PushBatch {
                    keys: vec![key_upsert("k1")],
                    metadata: Vec::new(),
                    sync_records: vec![record_upsert("r1", "k1"), record_upsert("r2", "k1")],
                },
            )
            .await
            .unwrap();
        assert_eq!(applied.digest, leaf_digest(["r1", "r2"]));

        let mut tombstone = record_upsert("r2", "k1");
        tombstone.tombstone = true;
        let applied = storage
            .apply_push(
                &user,
                &zone,
                PushBatch {
                    sync_records: vec![tombstone],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(applied.digest, leaf_digest(["r1"]));
    }

    #[tokio::test]
    async fn tombstone_all_advances_once_per_record() {
        let storage = MemorySyncStorage::new();
        let user = UserId::random();
        let zone = ZoneId::default();

        storage
            .apply_push(
                &user,
                &zone,
                PushBatch {
                    keys: vec![key_upsert("k1")],
                    metadata: Vec::new(),
                    sync_records: vec![record_upsert("r1", "k1")],
                },
            )
            .await
            .unwrap();

        let outcome = storage.tombstone_all(&user, &zone).await.unwrap();
        assert_eq!(outcome.deleted, 2);
        assert_eq!(outcome.gencount, 4);

        let state = storage.sync_state(&user, &zone).await.unwrap();
        assert_eq!(state.digest, LeafDigest::empty());

        // A second sweep finds nothing alive.
        let outcome = storage.tombstone_all(&user, &zone).await.unwrap();
        assert_eq!(outcome.deleted, 0);
        assert_eq!(outcome.gencount, 4);
    }

    #[tokio::test]
    async fn zones_and_users_are_isolated() {
        let storage = MemorySyncStorage::new();
        let user_a = UserId::random();
        let user_b = UserId::random();
        let zone = ZoneId::default();

        storage
            .apply_push(
                &user_a,
                &zone,
                PushBatch {
                    keys: vec![key_upsert("k1")],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(storage.crypto_key_exists(&user_a, &zone, "k1").await.unwrap());
        assert!(!storage.crypto_key_exists(&user_b, &zone, "k1").await.unwrap());
        let other_zone: ZoneId = "backup".parse().unwrap();
        assert!(!storage
            .crypto_key_exists(&user_a, &other_zone, "k1")
            .await
            .unwrap());
        assert_eq!(storage.sync_state(&user_b, &zone).await.unwrap().gencount, 0);
    }
}

// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Records of the three vault layers and the per-(user, zone) sync state.
//!
//! Every layer shares the client-chosen `item_uuid` that links one
//! credential across layers. Records are never physically removed; a
//! deletion is a push with `tombstone = true` and a fresh gencount.

use chrono::{DateTime, Utc};
use thiserror::Error;

use kftypes::keys::{KeyClass, KeyType, KeyUsageFlags};
use kftypes::messages::sync::{
    CredentialMetadataDto, CryptoKeyDto, PushRequest, SyncRecordDto,
};

use super::digest::LeafDigest;

/// Layer 1: an opaque key record. `data` is ciphertext under the client's
/// master key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CryptoKeyRecord {
    pub item_uuid: String,
    pub key_class: KeyClass,
    pub key_type: KeyType,
    pub label: Option<String>,
    pub application_label: Option<String>,
    pub data: Vec<u8>,
    pub access_group: String,
    pub usage_flags: KeyUsageFlags,
    pub gencount: i64,
    pub tombstone: bool,
    pub created_at: DateTime<Utc>,
}

/// Layer 2: searchable per-item metadata. `password_key_uuid` must reference
/// a Layer-1 record of the same (user, zone).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialMetadataRecord {
    pub item_uuid: String,
    pub server: String,
    pub account: String,
    pub protocol: String,
    pub port: u16,
    pub path: Option<String>,
    pub label: Option<String>,
    pub access_group: String,
    pub password_key_uuid: String,
    pub metadata_key_uuid: Option<String>,
    pub gencount: i64,
    pub tombstone: bool,
    pub created_at: DateTime<Utc>,
}

/// Layer 3: the encrypted payload. The alive records of this layer form the
/// leaf set of the manifest digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncRecord {
    pub item_uuid: String,
    pub parent_key_uuid: String,
    pub wrapped_key: Vec<u8>,
    pub enc_item: Vec<u8>,
    pub enc_version: i32,
    pub context_id: String,
    pub gencount: i64,
    pub tombstone: bool,
    pub created_at: DateTime<Utc>,
}

/// One row per (user, zone): the highest gencount ever assigned and the
/// digest of the current alive leaf set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncState {
    pub gencount: i64,
    pub digest: LeafDigest,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            gencount: 0,
            digest: LeafDigest::empty(),
        }
    }
}

/// Incoming Layer-1 record; gencount and creation time are assigned by the
/// store.
#[derive(Clone, Debug)]
pub struct CryptoKeyUpsert {
    pub item_uuid: String,
    pub key_class: KeyClass,
    pub key_type: KeyType,
    pub label: Option<String>,
    pub application_label: Option<String>,
    pub data: Vec<u8>,
    pub access_group: String,
    pub usage_flags: KeyUsageFlags,
    pub tombstone: bool,
}

impl CryptoKeyUpsert {
    pub fn into_record(self, gencount: i64, created_at: DateTime<Utc>) -> CryptoKeyRecord {
        CryptoKeyRecord {
            item_uuid: self.item_uuid,
            key_class: self.key_class,
            key_type: self.key_type,
            label: self.label,
            application_label: self.application_label,
            data: self.data,
            access_group: self.access_group,
            usage_flags: self.usage_flags,
            gencount,
            tombstone: self.tombstone,
            created_at,
        }
    }
}

/// Incoming Layer-2 record.
#[derive(Clone, Debug)]
pub struct CredentialMetadataUpsert {
    pub item_uuid: String,
    pub server: String,
    pub account: String,
    pub protocol: String,
    pub port: u16,
    pub path: Option<String>,
    pub label: Option<String>,
    pub access_group: String,
    pub password_key_uuid: String,
    pub metadata_key_uuid: Option<String>,
    pub tombstone: bool,
}

impl CredentialMetadataUpsert {
    pub fn into_record(
        self,
        gencount: i64,
        created_at: DateTime<Utc>,
    ) -> CredentialMetadataRecord {
        CredentialMetadataRecord {
            item_uuid: self.item_uuid,
            server: self.server,
            account: self.account,
            protocol: self.protocol,
            port: self.port,
            path: self.path,
            label: self.label,
            access_group: self.access_group,
            password_key_uuid: self.password_key_uuid,
            metadata_key_uuid: self.metadata_key_uuid,
            gencount,
            tombstone: self.tombstone,
            created_at,
        }
    }
}

/// Incoming Layer-3 record.
#[derive(Clone, Debug)]
pub struct SyncRecordUpsert {
    pub item_uuid: String,
    pub parent_key_uuid: String,
    pub wrapped_key: Vec<u8>,
    pub enc_item: Vec<u8>,
    pub enc_version: i32,
    pub context_id: String,
    pub tombstone: bool,
}

impl SyncRecordUpsert {
    pub fn into_record(self, gencount: i64, created_at: DateTime<Utc>) -> SyncRecord {
        SyncRecord {
            item_uuid: self.item_uuid,
            parent_key_uuid: self.parent_key_uuid,
            wrapped_key: self.wrapped_key,
            enc_item: self.enc_item,
            enc_version: self.enc_version,
            context_id: self.context_id,
            gencount,
            tombstone: self.tombstone,
            created_at,
        }
    }
}

/// One push batch. Arrays keep the client's order; gencounts are assigned
/// keys, then metadata, then sync records.
#[derive(Clone, Debug, Default)]
pub struct PushBatch {
    pub keys: Vec<CryptoKeyUpsert>,
    pub metadata: Vec<CredentialMetadataUpsert>,
    pub sync_records: Vec<SyncRecordUpsert>,
}

impl PushBatch {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.metadata.is_empty() && self.sync_records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len() + self.metadata.len() + self.sync_records.len()
    }
}

/// A record that fails boundary validation before it reaches the store.
#[derive(Debug, Error)]
pub enum InvalidRecord {
    #[error("enc_version must be at least 1 (item {item_uuid})")]
    EncVersion { item_uuid: String },
}

impl From<CryptoKeyDto> for CryptoKeyUpsert {
    fn from(dto: CryptoKeyDto) -> Self {
        Self {
            item_uuid: dto.item_uuid,
            key_class: dto.key_class,
            key_type: dto.key_type,
            label: dto.label,
            application_label: dto.application_label,
            data: dto.data,
            access_group: dto.access_group,
            usage_flags: dto.usage_flags.into_iter().collect(),
            tombstone: dto.tombstone,
        }
    }
}

impl From<CredentialMetadataDto> for CredentialMetadataUpsert {
    fn from(dto: CredentialMetadataDto) -> Self {
        Self {
            item_uuid: dto.item_uuid,
            server: dto.server,
            account: dto.account,
            protocol: dto.protocol,
            port: dto.port,
            path: dto.path,
            label: dto.label,
            access_group: dto.access_group,
            password_key_uuid: dto.password_key_uuid,
            metadata_key_uuid: dto.metadata_key_uuid,
            tombstone: dto.tombstone,
        }
    }
}

impl TryFrom<SyncRecordDto> for SyncRecordUpsert {
    type Error = InvalidRecord;

    fn try_from(dto: SyncRecordDto) -> Result<Self, Self::Error> {
        if dto.enc_version < 1 {
            return Err(InvalidRecord::EncVersion {
                item_uuid: dto.item_uuid,
            });
        }
        Ok(Self {
            item_uuid: dto.item_uuid,
            parent_key_uuid: dto.parent_key_uuid,
            wrapped_key: dto.wrapped_key,
            enc_item: dto.enc_item,
            enc_version: dto.enc_version,
            context_id: dto.context_id,
            tombstone: dto.tombstone,
        })
    }
}

impl TryFrom<PushRequest> for PushBatch {
    type Error = InvalidRecord;

    fn try_from(request: PushRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            keys: request.keys.into_iter().map(Into::into).collect(),
            metadata: request
                .credential_metadata
                .into_iter()
                .map(Into::into)
                .collect(),
            sync_records: request
                .sync_records
                .into_iter()
                .map(TryInto::try_into)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl From<CryptoKeyRecord> for CryptoKeyDto {
    fn from(record: CryptoKeyRecord) -> Self {
        Self {
            item_uuid: record.item_uuid,
            key_class: record.key_class,
            key_type: record.key_type,
            label: record.label,
            application_label: record.application_label,
            data: record.data,
            access_group: record.access_group,
            usage_flags: record.usage_flags.usages(),
            tombstone: record.tombstone,
            gencount: Some(record.gencount),
        }
    }
}

impl From<CredentialMetadataRecord> for CredentialMetadataDto {
    fn from(record: CredentialMetadataRecord) -> Self {
        Self {
            item_uuid: record.item_uuid,
            server: record.server,
            account: record.account,
            protocol: record.protocol,
            port: record.port,
            path: record.path,
            label: record.label,
            access_group: record.access_group,
            password_key_uuid: record.password_key_uuid,
            metadata_key_uuid: record.metadata_key_uuid,
            tombstone: record.tombstone,
            gencount: Some(record.gencount),
        }
    }
}

impl From<SyncRecord> for SyncRecordDto {
    fn from(record: SyncRecord) -> Self {
        Self {
            item_uuid: record.item_uuid,
            parent_key_uuid: record.parent_key_uuid,
            wrapped_key: record.wrapped_key,
            enc_item: record.enc_item,
            enc_version: record.enc_version,
            context_id: record.context_id,
            tombstone: record.tombstone,
            gencount: Some(record.gencount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_dto(enc_version: i32) -> SyncRecordDto {
        SyncRecordDto {
            item_uuid: "r1".to_string(),
            parent_key_uuid: "k1".to_string(),
            wrapped_key: vec![1; 48],
            enc_item: vec![2; 128],
            enc_version,
            context_id: "default".to_string(),
            tombstone: false,
            gencount: None,
        }
    }

    #[test]
    fn enc_version_zero_is_rejected() {
        assert!(SyncRecordUpsert::try_from(record_dto(0)).is_err());
        assert!(SyncRecordUpsert::try_from(record_dto(1)).is_ok());
    }

    #[test]
    fn batch_len_spans_all_layers() {
        let batch = PushBatch {
            keys: Vec::new(),
            metadata: Vec::new(),
            sync_records: vec![SyncRecordUpsert::try_from(record_dto(1)).unwrap()],
        };
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
        assert!(PushBatch::default().is_empty());
    }
}

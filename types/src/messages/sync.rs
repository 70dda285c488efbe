// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! DTOs of the sync surface. Opaque byte fields travel as standard base64
//! strings; timestamps are integer milliseconds since the epoch.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::identifiers::{UserId, ZoneId};
use crate::keys::{KeyClass, KeyType, KeyUsage};

fn default_context_id() -> String {
    "default".to_string()
}

/// Layer-1 key record on the wire. `gencount` is server-assigned and only
/// present on pull responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CryptoKeyDto {
    pub item_uuid: String,
    pub key_class: KeyClass,
    pub key_type: KeyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_label: Option<String>,
    #[serde(with = "codec::base64_bytes")]
    pub data: Vec<u8>,
    pub access_group: String,
    #[serde(default)]
    pub usage_flags: Vec<KeyUsage>,
    #[serde(default)]
    pub tombstone: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gencount: Option<i64>,
}

/// Layer-2 searchable metadata on the wire. `server` and `account` are
/// user-chosen strings; the server indexes but never interprets them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialMetadataDto {
    pub item_uuid: String,
    pub server: String,
    pub account: String,
    pub protocol: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub access_group: String,
    pub password_key_uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_key_uuid: Option<String>,
    #[serde(default)]
    pub tombstone: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gencount: Option<i64>,
}

/// Layer-3 encrypted payload on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncRecordDto {
    pub item_uuid: String,
    pub parent_key_uuid: String,
    #[serde(with = "codec::base64_bytes")]
    pub wrapped_key: Vec<u8>,
    #[serde(with = "codec::base64_bytes")]
    pub enc_item: Vec<u8>,
    pub enc_version: i32,
    #[serde(default = "default_context_id")]
    pub context_id: String,
    #[serde(default)]
    pub tombstone: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gencount: Option<i64>,
}

/// Query parameters of the zone-scoped GET/DELETE endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZoneQuery {
    #[serde(default)]
    pub zone: ZoneId,
}

/// Response of `GET /sync/manifest`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestResponse {
    pub zone: ZoneId,
    pub gencount: i64,
    #[serde(with = "codec::base64_bytes")]
    pub digest: Vec<u8>,
}

/// Request body of `POST /sync/pull`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub zone: ZoneId,
    #[serde(default)]
    pub last_gencount: i64,
    #[serde(default)]
    pub include_tombstoned: bool,
}

/// Response of `POST /sync/pull`. Records are ordered by ascending gencount
/// within each layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PullResponse {
    pub keys: Vec<CryptoKeyDto>,
    pub credential_metadata: Vec<CredentialMetadataDto>,
    pub sync_records: Vec<SyncRecordDto>,
    pub gencount: i64,
}

/// Request body of `POST /sync/push`. Gencounts are assigned server-side in
/// the order keys, credential metadata, sync records.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PushRequest {
    #[serde(default)]
    pub zone: ZoneId,
    #[serde(default)]
    pub keys: Vec<CryptoKeyDto>,
    #[serde(default)]
    pub credential_metadata: Vec<CredentialMetadataDto>,
    #[serde(default)]
    pub sync_records: Vec<SyncRecordDto>,
}

/// Response of `POST /sync/push`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushResponse {
    pub gencount: i64,
    #[serde(with = "codec::base64_bytes")]
    pub digest: Vec<u8>,
    pub processed_count: usize,
    pub conflicts: Vec<String>,
}

/// Response of `DELETE /sync/credentials`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: u64,
    pub gencount: i64,
}

/// Change hint fanned out over the live stream. Carries no payload bytes;
/// clients react by pulling.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    CredentialsChanged {
        user_id: UserId,
        zone: ZoneId,
        gencount: i64,
        timestamp: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_event_wire_shape() {
        let event = LiveEvent::CredentialsChanged {
            user_id: UserId::random(),
            zone: ZoneId::default(),
            gencount: 7,
            timestamp: 1_700_000_000_000,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["type"], "credentials_changed");
        assert_eq!(json["zone"], "default");
        assert_eq!(json["gencount"], 7);
    }

    #[test]
    fn pull_request_defaults() {
        let request: PullRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.zone, ZoneId::default());
        assert_eq!(request.last_gencount, 0);
        assert!(!request.include_tombstoned);
    }

    #[test]
    fn sync_record_context_defaults() {
        let record: SyncRecordDto = serde_json::from_str(
            r#"{
                "item_uuid": "r1",
                "parent_key_uuid": "k1",
                "wrapped_key": "AAECAw==",
                "enc_item": "BAUGBw==",
                "enc_version": 1
            }"#,
        )
        .unwrap();
        assert_eq!(record.context_id, "default");
        assert!(!record.tombstone);
        assert_eq!(record.wrapped_key, vec![0, 1, 2, 3]);
    }
}

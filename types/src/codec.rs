// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transport encoding for opaque byte fields.
//!
//! Cryptographic payloads (`data`, `wrapped_key`, `enc_item`, digests) are
//! carried as standard base64 strings on the wire and stored byte-exact;
//! the server never interprets them.

use base64::{engine::general_purpose::STANDARD, Engine as _};

pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(value)
}

/// serde adapter for `Vec<u8>` fields carried as base64 strings.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(|e| D::Error::custom(format!("invalid base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Eq, Debug)]
    struct Opaque {
        #[serde(with = "super::base64_bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn bytes_round_trip_as_base64() {
        let opaque = Opaque {
            data: vec![0x00, 0x01, 0xfe, 0xff],
        };
        let json = serde_json::to_string(&opaque).unwrap();
        assert_eq!(json, r#"{"data":"AAH+/w=="}"#);
        assert_eq!(serde_json::from_str::<Opaque>(&json).unwrap(), opaque);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(serde_json::from_str::<Opaque>(r#"{"data":"not base64!"}"#).is_err());
    }
}

// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Deterministic fingerprint over the alive leaf set of one (user, zone).
//!
//! Two parties hold equal digests exactly when they hold the same alive
//! `item_uuid` set, which lets clients skip the pull body when nothing
//! changed.

use std::fmt::{Debug, Formatter};

use sha2::{Digest as _, Sha256};
use thiserror::Error;

/// Separator byte fed into the hasher after every leaf id.
const LEAF_SEPARATOR: u8 = 0x7c;

/// 32-byte digest of the alive Layer-3 `item_uuid` set.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LeafDigest([u8; 32]);

impl LeafDigest {
    /// Digest of the empty leaf set: SHA-256 over zero input bytes.
    pub fn empty() -> Self {
        leaf_digest(std::iter::empty())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Standard base64 of the digest bytes, as carried on the wire.
    pub fn encode(&self) -> String {
        kftypes::codec::encode(self.0)
    }
}

impl From<[u8; 32]> for LeafDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for LeafDigest {
    type Error = InvalidDigestLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| InvalidDigestLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl Debug for LeafDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LeafDigest({})", self.encode())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("digest must be 32 bytes, got {0}")]
pub struct InvalidDigestLength(pub usize);

/// Computes the digest over the given leaf ids. Input order does not matter;
/// ids are sorted lexicographically before hashing.
pub fn leaf_digest<'a>(ids: impl IntoIterator<Item = &'a str>) -> LeafDigest {
    let mut ids: Vec<&str> = ids.into_iter().collect();
    ids.sort_unstable();
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update([LEAF_SEPARATOR]);
    }
    LeafDigest(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use sha2::{Digest as _, Sha256};

    use super::*;

    #[test]
    fn digest_is_order_independent() {
        let a = leaf_digest(["r1", "r2", "r3"]);
        let b = leaf_digest(["r3", "r1", "r2"]);
        assert_eq!(a, b);
    }

    #[test]
    fn digest_depends_on_the_leaf_set() {
        assert_ne!(leaf_digest(["r1"]), leaf_digest(["r2"]));
        assert_ne!(leaf_digest(["r1"]), leaf_digest(["r1", "r2"]));
    }

    #[test]
    fn empty_set_digest_is_sha256_of_no_bytes() {
        let expected: [u8; 32] = Sha256::digest(b"").into();
        assert_eq!(LeafDigest::empty().as_bytes(), &expected);
        // The well-known SHA-256 empty-input value.
        assert_eq!(
            LeafDigest::empty().encode(),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn single_leaf_matches_manual_hash() {
        let expected: [u8; 32] = Sha256::digest(b"r1|").into();
        assert_eq!(leaf_digest(["r1"]).as_bytes(), &expected);
    }
}

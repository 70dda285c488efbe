// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Vocabulary of Layer-1 key records.

use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage class of a key record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyClass {
    Symmetric,
    Public,
    Private,
}

impl KeyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyClass::Symmetric => "symmetric",
            KeyClass::Public => "public",
            KeyClass::Private => "private",
        }
    }
}

impl Display for KeyClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KeyClass {
    type Err = UnknownKeyVocabulary;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symmetric" => Ok(KeyClass::Symmetric),
            "public" => Ok(KeyClass::Public),
            "private" => Ok(KeyClass::Private),
            other => Err(UnknownKeyVocabulary(other.to_string())),
        }
    }
}

/// Algorithm of a key record. The server never uses the key; the type is
/// carried verbatim for the clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "aes-gcm-256")]
    AesGcm256,
    #[serde(rename = "ed25519")]
    Ed25519,
    #[serde(rename = "x25519")]
    X25519,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::AesGcm256 => "aes-gcm-256",
            KeyType::Ed25519 => "ed25519",
            KeyType::X25519 => "x25519",
        }
    }
}

impl Display for KeyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = UnknownKeyVocabulary;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aes-gcm-256" => Ok(KeyType::AesGcm256),
            "ed25519" => Ok(KeyType::Ed25519),
            "x25519" => Ok(KeyType::X25519),
            other => Err(UnknownKeyVocabulary(other.to_string())),
        }
    }
}

/// A single permitted use of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUsage {
    Encrypt,
    Decrypt,
    Wrap,
    Unwrap,
    Sign,
    Verify,
    Derive,
}

impl KeyUsage {
    pub const ALL: [KeyUsage; 7] = [
        KeyUsage::Encrypt,
        KeyUsage::Decrypt,
        KeyUsage::Wrap,
        KeyUsage::Unwrap,
        KeyUsage::Sign,
        KeyUsage::Verify,
        KeyUsage::Derive,
    ];

    fn bit(&self) -> u8 {
        match self {
            KeyUsage::Encrypt => 0b0000_0001,
            KeyUsage::Decrypt => 0b0000_0010,
            KeyUsage::Wrap => 0b0000_0100,
            KeyUsage::Unwrap => 0b0000_1000,
            KeyUsage::Sign => 0b0001_0000,
            KeyUsage::Verify => 0b0010_0000,
            KeyUsage::Derive => 0b0100_0000,
        }
    }
}

/// Seven-bit set of [`KeyUsage`] values.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsageFlags(u8);

impl KeyUsageFlags {
    const MASK: u8 = 0b0111_1111;

    pub fn empty() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Reconstructs the set from its stored bit pattern. `None` if a bit
    /// outside the seven defined usages is set.
    pub fn from_bits(bits: u8) -> Option<Self> {
        ((bits & !Self::MASK) == 0).then_some(Self(bits))
    }

    pub fn contains(&self, usage: KeyUsage) -> bool {
        self.0 & usage.bit() != 0
    }

    pub fn insert(&mut self, usage: KeyUsage) {
        self.0 |= usage.bit();
    }

    pub fn usages(&self) -> Vec<KeyUsage> {
        KeyUsage::ALL
            .into_iter()
            .filter(|usage| self.contains(*usage))
            .collect()
    }
}

impl FromIterator<KeyUsage> for KeyUsageFlags {
    fn from_iter<I: IntoIterator<Item = KeyUsage>>(iter: I) -> Self {
        let mut flags = Self::empty();
        for usage in iter {
            flags.insert(usage);
        }
        flags
    }
}

impl Debug for KeyUsageFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.usages()).finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown key vocabulary value: {0}")]
pub struct UnknownKeyVocabulary(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_flags_round_trip_through_bits() {
        let flags: KeyUsageFlags = [KeyUsage::Wrap, KeyUsage::Unwrap].into_iter().collect();
        assert_eq!(KeyUsageFlags::from_bits(flags.bits()), Some(flags));
        assert_eq!(flags.usages(), vec![KeyUsage::Wrap, KeyUsage::Unwrap]);
        assert!(flags.contains(KeyUsage::Wrap));
        assert!(!flags.contains(KeyUsage::Sign));
    }

    #[test]
    fn out_of_range_bits_are_rejected() {
        assert!(KeyUsageFlags::from_bits(0b1000_0000).is_none());
        assert!(KeyUsageFlags::from_bits(0b0111_1111).is_some());
    }

    #[test]
    fn wire_names_match_the_protocol() {
        assert_eq!(serde_json::to_string(&KeyType::AesGcm256).unwrap(), "\"aes-gcm-256\"");
        assert_eq!(serde_json::to_string(&KeyClass::Symmetric).unwrap(), "\"symmetric\"");
        assert_eq!(serde_json::to_string(&KeyUsage::Wrap).unwrap(), "\"wrap\"");
    }
}

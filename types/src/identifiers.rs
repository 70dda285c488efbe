// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The zone every client starts out in.
pub const DEFAULT_ZONE: &str = "default";

const MAX_ZONE_LENGTH: usize = 128;

/// Stable opaque identifier of a user account.
///
/// Produced by the identity adapter; the sync core never inspects it further.
#[derive(
    Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Debug,
)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A namespace within one user. Sync state is tracked independently per
/// (user, zone).
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Debug)]
#[serde(try_from = "String")]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(zone: String) -> Result<Self, InvalidZone> {
        if zone.is_empty() {
            return Err(InvalidZone::Empty);
        }
        if zone.len() > MAX_ZONE_LENGTH {
            return Err(InvalidZone::TooLong);
        }
        if zone.chars().any(char::is_control) {
            return Err(InvalidZone::ControlCharacter);
        }
        Ok(Self(zone))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self(DEFAULT_ZONE.to_string())
    }
}

impl Display for ZoneId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ZoneId {
    type Error = InvalidZone;

    fn try_from(zone: String) -> Result<Self, Self::Error> {
        Self::new(zone)
    }
}

impl FromStr for ZoneId {
    type Err = InvalidZone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidZone {
    #[error("zone must not be empty")]
    Empty,
    #[error("zone exceeds {MAX_ZONE_LENGTH} bytes")]
    TooLong,
    #[error("zone contains control characters")]
    ControlCharacter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_validation() {
        assert!(ZoneId::new("default".to_string()).is_ok());
        assert!(ZoneId::new("work-laptop".to_string()).is_ok());
        assert_eq!(ZoneId::new(String::new()), Err(InvalidZone::Empty));
        assert_eq!(
            ZoneId::new("a".repeat(MAX_ZONE_LENGTH + 1)),
            Err(InvalidZone::TooLong)
        );
        assert_eq!(
            ZoneId::new("bad\nzone".to_string()),
            Err(InvalidZone::ControlCharacter)
        );
    }

    #[test]
    fn default_zone_round_trips_through_serde() {
        let zone: ZoneId = serde_json::from_str("\"default\"").unwrap();
        assert_eq!(zone, ZoneId::default());
        assert_eq!(serde_json::to_string(&zone).unwrap(), "\"default\"");
    }
}

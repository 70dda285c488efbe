// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-level error taxonomy of the sync API.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Machine-readable error codes surfaced by the sync API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing or invalid bearer credential.
    Unauthenticated,
    /// Malformed body, unknown zone format or bad base64.
    InvalidRequest,
    /// A pushed record references a parent key that does not exist.
    InvalidReference,
    /// Unique-key clash.
    Conflict,
    /// The durable store failed; retriable.
    StorageUnavailable,
    /// The request was canceled by the caller.
    Canceled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidReference => "invalid_reference",
            ErrorCode::Conflict => "conflict",
            ErrorCode::StorageUnavailable => "storage_unavailable",
            ErrorCode::Canceled => "canceled",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// JSON body accompanying every non-2xx response. Carries no stack traces
/// and no internal identifiers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorCode,
    pub detail: String,
}

// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use thiserror::Error;

use crate::errors::StorageError;

/// Error reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error assembling a delta pull.
#[derive(Debug, Error)]
pub enum PullError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error applying a push batch. The first error aborts the whole batch; no
/// record of a failed push is ever visible to a later pull.
#[derive(Debug, Error)]
pub enum PushError {
    /// The batch references a Layer-1 key that neither exists in storage nor
    /// earlier in the batch.
    #[error("unknown parent key reference: {0}")]
    InvalidReference(String),
    /// Unique-key clash while upserting.
    #[error("conflicting write for item {0}")]
    Conflict(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error tombstoning a whole zone.
#[derive(Debug, Error)]
pub enum DeleteError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

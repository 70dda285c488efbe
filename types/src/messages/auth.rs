// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! DTOs of the token refresh surface.

use serde::{Deserialize, Serialize};

/// Request body of `POST /auth/refresh`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Response of `POST /auth/refresh`. The previous refresh token is revoked
/// the moment this pair is issued.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

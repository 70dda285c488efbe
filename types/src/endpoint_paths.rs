// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Paths of the server's public endpoints.

/// Liveness probe.
pub const ENDPOINT_HEALTH_CHECK: &str = "/health";

/// Sync endpoints
pub const ENDPOINT_SYNC_MANIFEST: &str = "/sync/manifest";
pub const ENDPOINT_SYNC_PULL: &str = "/sync/pull";
pub const ENDPOINT_SYNC_PUSH: &str = "/sync/push";
pub const ENDPOINT_SYNC_CREDENTIALS: &str = "/sync/credentials";
pub const ENDPOINT_SYNC_WS: &str = "/sync/ws";

/// Auth endpoints
pub const ENDPOINT_AUTH_REFRESH: &str = "/auth/refresh";

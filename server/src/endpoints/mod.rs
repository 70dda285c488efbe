// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod auth;
pub(crate) mod error;
pub mod sync;

pub use error::ApiError;
pub(crate) use error::{json_error_handler, query_error_handler};

use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, Responder};

use kfbackend::auth::{storage_provider_trait::AuthStorageProvider, AuthProvider};
use kftypes::identifiers::UserId;

/// Liveness probe.
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Extracts the bearer token from the `Authorization` header.
pub(crate) fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Resolves the caller identity. Every sync operation requires this; the
/// user id is never taken from a request body.
pub(crate) async fn authorize<A: AuthStorageProvider>(
    req: &HttpRequest,
    auth_provider: &AuthProvider<A>,
) -> Result<UserId, ApiError> {
    let token = bearer_token(req).ok_or_else(ApiError::unauthenticated)?;
    Ok(auth_provider.verify(token).await?)
}

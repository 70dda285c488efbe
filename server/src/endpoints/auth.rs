// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use actix_web::web::{Data, Json};
use actix_web::HttpResponse;

use kfbackend::auth::{storage_provider_trait::AuthStorageProvider, AuthProvider};
use kftypes::messages::auth::{RefreshRequest, RefreshResponse};

use super::ApiError;

/// Rotates a refresh token into a fresh access/refresh pair. The presented
/// token is revoked on use; replaying it yields `unauthenticated`.
#[tracing::instrument(name = "Refresh token pair", skip_all)]
pub(crate) async fn refresh_token<A: AuthStorageProvider>(
    request: Json<RefreshRequest>,
    auth_provider: Data<AuthProvider<A>>,
) -> Result<HttpResponse, ApiError> {
    let pair = auth_provider.refresh(&request.refresh_token).await?;
    Ok(HttpResponse::Ok().json(RefreshResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

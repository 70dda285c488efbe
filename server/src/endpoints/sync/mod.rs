// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use actix_web::web::{Data, Json, Query};
use actix_web::{HttpRequest, HttpResponse};

use kfbackend::auth::{storage_provider_trait::AuthStorageProvider, AuthProvider};
use kfbackend::sync::records::PushBatch;
use kfbackend::sync::storage_provider_trait::SyncStorageProvider;
use kfbackend::sync::SyncEngine;
use kftypes::messages::sync::{
    DeleteResponse, ManifestResponse, PullRequest, PullResponse, PushRequest, PushResponse,
    ZoneQuery,
};

use self::ws::DispatchNotifier;
use super::{authorize, ApiError};

pub mod ws;

/// Summarizes a (user, zone): current gencount and alive-set digest.
#[tracing::instrument(name = "Manifest", skip_all)]
pub(crate) async fn manifest<S: SyncStorageProvider, A: AuthStorageProvider>(
    req: HttpRequest,
    query: Query<ZoneQuery>,
    sync_storage: Data<S>,
    auth_provider: Data<AuthProvider<A>>,
) -> Result<HttpResponse, ApiError> {
    let user_id = authorize(&req, auth_provider.get_ref()).await?;
    let manifest = SyncEngine::manifest(sync_storage.get_ref(), &user_id, &query.zone).await?;
    Ok(HttpResponse::Ok().json(ManifestResponse {
        zone: manifest.zone,
        gencount: manifest.gencount,
        digest: manifest.digest.to_vec(),
    }))
}

/// Returns all records above the client's last gencount, ascending, with
/// tombstones filtered unless requested.
#[tracing::instrument(name = "Pull delta", skip_all)]
pub(crate) async fn pull<S: SyncStorageProvider, A: AuthStorageProvider>(
    req: HttpRequest,
    request: Json<PullRequest>,
    sync_storage: Data<S>,
    auth_provider: Data<AuthProvider<A>>,
) -> Result<HttpResponse, ApiError> {
    let user_id = authorize(&req, auth_provider.get_ref()).await?;
    let request = request.into_inner();
    let outcome = SyncEngine::pull(
        sync_storage.get_ref(),
        &user_id,
        &request.zone,
        request.last_gencount,
        request.include_tombstoned,
    )
    .await?;
    Ok(HttpResponse::Ok().json(PullResponse {
        keys: outcome.keys.into_iter().map(Into::into).collect(),
        credential_metadata: outcome.metadata.into_iter().map(Into::into).collect(),
        sync_records: outcome.sync_records.into_iter().map(Into::into).collect(),
        gencount: outcome.gencount,
    }))
}

/// Applies one push batch atomically and reports the new manifest.
#[tracing::instrument(name = "Push delta", skip_all)]
pub(crate) async fn push<S: SyncStorageProvider, A: AuthStorageProvider>(
    req: HttpRequest,
    request: Json<PushRequest>,
    sync_storage: Data<S>,
    auth_provider: Data<AuthProvider<A>>,
    ws_dispatch_notifier: Data<DispatchNotifier>,
) -> Result<HttpResponse, ApiError> {
    let user_id = authorize(&req, auth_provider.get_ref()).await?;
    let request = request.into_inner();
    let zone = request.zone.clone();
    let batch = PushBatch::try_from(request)?;
    let outcome = SyncEngine::push(
        sync_storage.get_ref(),
        ws_dispatch_notifier.get_ref(),
        &user_id,
        &zone,
        batch,
    )
    .await?;
    Ok(HttpResponse::Ok().json(PushResponse {
        gencount: outcome.gencount,
        digest: outcome.digest.to_vec(),
        processed_count: outcome.processed,
        conflicts: Vec::new(),
    }))
}

/// Tombstones every record of the zone. Deletion is an append: the records
/// stay stored, flagged, and reachable via `include_tombstoned` pulls.
#[tracing::instrument(name = "Delete credentials", skip_all)]
pub(crate) async fn delete_credentials<S: SyncStorageProvider, A: AuthStorageProvider>(
    req: HttpRequest,
    query: Query<ZoneQuery>,
    sync_storage: Data<S>,
    auth_provider: Data<AuthProvider<A>>,
    ws_dispatch_notifier: Data<DispatchNotifier>,
) -> Result<HttpResponse, ApiError> {
    let user_id = authorize(&req, auth_provider.get_ref()).await?;
    let outcome = SyncEngine::delete_all(
        sync_storage.get_ref(),
        ws_dispatch_notifier.get_ref(),
        &user_id,
        &query.zone,
    )
    .await?;
    Ok(HttpResponse::Ok().json(DeleteResponse {
        deleted: outcome.deleted,
        gencount: outcome.gencount,
    }))
}

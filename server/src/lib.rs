// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Keyfold server.

pub mod configurations;
pub mod endpoints;
pub mod storage_provider;
pub mod telemetry;

use std::net::TcpListener;

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};
use tracing_actix_web::TracingLogger;

use kfbackend::auth::{storage_provider_trait::AuthStorageProvider, AuthProvider};
use kfbackend::settings::WebsocketSettings;
use kfbackend::sync::storage_provider_trait::SyncStorageProvider;
use kftypes::endpoint_paths::{
    ENDPOINT_AUTH_REFRESH, ENDPOINT_HEALTH_CHECK, ENDPOINT_SYNC_CREDENTIALS,
    ENDPOINT_SYNC_MANIFEST, ENDPOINT_SYNC_PULL, ENDPOINT_SYNC_PUSH, ENDPOINT_SYNC_WS,
};

use crate::endpoints::{
    auth::refresh_token,
    health_check, json_error_handler, query_error_handler,
    sync::{
        delete_credentials, manifest, pull, push,
        ws::{upgrade_connection, DispatchNotifier},
    },
};

/// Configure and run the server application.
pub fn run<S: SyncStorageProvider, A: AuthStorageProvider>(
    listener: TcpListener,
    ws_dispatch_notifier: DispatchNotifier,
    sync_storage: S,
    auth_provider: AuthProvider<A>,
    ws_settings: WebsocketSettings,
    allowed_origins: Vec<String>,
) -> Result<Server, std::io::Error> {
    // Wrap shared state in a Data<T>
    let sync_storage_data = Data::new(sync_storage);
    let auth_provider_data = Data::new(auth_provider);
    let ws_dispatch_notifier_data = Data::new(ws_dispatch_notifier);
    let ws_settings_data = Data::new(ws_settings);

    if let Ok(address) = listener.local_addr() {
        tracing::info!(%address, "Starting server");
    }

    // Create & run the server
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors_config(&allowed_origins))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .app_data(sync_storage_data.clone())
            .app_data(auth_provider_data.clone())
            .app_data(ws_dispatch_notifier_data.clone())
            .app_data(ws_settings_data.clone())
            .route(ENDPOINT_HEALTH_CHECK, web::get().to(health_check))
            // Sync endpoints
            .route(ENDPOINT_SYNC_MANIFEST, web::get().to(manifest::<S, A>))
            .route(ENDPOINT_SYNC_PULL, web::post().to(pull::<S, A>))
            .route(ENDPOINT_SYNC_PUSH, web::post().to(push::<S, A>))
            .route(
                ENDPOINT_SYNC_CREDENTIALS,
                web::delete().to(delete_credentials::<S, A>),
            )
            // WS endpoint
            .route(ENDPOINT_SYNC_WS, web::get().to(upgrade_connection::<A>))
            // Auth endpoint
            .route(ENDPOINT_AUTH_REFRESH, web::post().to(refresh_token::<A>))
    })
    .listen(listener)?
    .run();
    Ok(server)
}

fn cors_config(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "DELETE"])
        .allow_any_header()
        .max_age(3600);
    for origin in allowed_origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

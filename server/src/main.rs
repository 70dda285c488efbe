// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::net::TcpListener;
use std::sync::Arc;

use kfbackend::auth::AuthProvider;
use kfserver::{
    configurations::get_configuration,
    endpoints::sync::ws::DispatchNotifier,
    run,
    storage_provider::postgres::{connect_to_database, PostgresAuthStorage, PostgresSyncStorage},
    telemetry::{get_subscriber, init_subscriber},
};
use tracing::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Configure logging/trace subscription
    let subscriber = get_subscriber("kfserver".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    // Load configuration
    let configuration = get_configuration("server/").expect("Could not load configuration.");

    // Port binding
    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(address)?;

    info!(
        host = configuration.database.host,
        "Connecting to postgres server",
    );
    // Try again for 10 times each second in case the postgres server is
    // coming up.
    let mut counter = 0;
    let mut pool_result = connect_to_database(&configuration.database).await;
    while let Err(error) = &pool_result {
        info!(%error, "Failed to connect to postgres server");
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        counter += 1;
        if counter > 10 {
            panic!("Database not ready after 10 seconds.");
        }
        pool_result = connect_to_database(&configuration.database).await;
    }
    let pool = pool_result.expect("Database not ready");

    let sync_storage = PostgresSyncStorage::new(pool.clone());
    let auth_storage = Arc::new(PostgresAuthStorage::new(pool));
    let auth_provider = AuthProvider::new(auth_storage, &configuration.auth);

    let ws_dispatch_notifier = DispatchNotifier::default_addr();

    // Start the server
    run(
        listener,
        ws_dispatch_notifier,
        sync_storage,
        auth_provider,
        configuration.websocket.clone(),
        configuration.application.allowed_origins.clone(),
    )?
    .await
}

// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::net::TcpListener;
use std::sync::Arc;

use once_cell::sync::Lazy;

use kfbackend::auth::tokens::TokenPair;
use kfbackend::auth::AuthProvider;
use kfbackend::settings::{AuthSettings, WebsocketSettings};
use kfserver::endpoints::sync::ws::DispatchNotifier;
use kfserver::run;
use kfserver::storage_provider::memory::{MemoryAuthStorage, MemorySyncStorage};
use kfserver::telemetry::{get_subscriber, init_subscriber};
use kftypes::identifiers::UserId;

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();
    // This allows us to choose not to capture traces for tests that pass.
    // To get all logs just run `TEST_LOG=true cargo test health_check_works | bunyan`.
    // bunyan can be installed via `cargo install bunyan`.
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

/// A server instance running against in-memory providers.
pub struct TestApp {
    pub address: String,
    pub ws_dispatch: DispatchNotifier,
    auth_provider: AuthProvider<MemoryAuthStorage>,
}

impl TestApp {
    /// Mints a token pair for the given user, as the operator seam would.
    pub async fn issue_tokens(&self, user_id: &UserId) -> TokenPair {
        self.auth_provider
            .issue_token_pair(user_id)
            .await
            .expect("Failed to issue token pair.")
    }
}

/// Start the server on a random port with in-memory providers. Returns the
/// address and handles for tests to mint tokens and dispatch events.
pub async fn spawn_app() -> TestApp {
    // Initialize tracing subscription only once.
    Lazy::force(&TRACING);

    // Port binding
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port.");
    let port = listener.local_addr().expect("No local address.").port();

    let ws_dispatch = DispatchNotifier::default_addr();
    let sync_storage = MemorySyncStorage::new();
    let auth_storage = Arc::new(MemoryAuthStorage::new());
    let auth_provider = AuthProvider::new(auth_storage, &AuthSettings::default());

    // Start the server
    let server = run(
        listener,
        ws_dispatch.clone(),
        sync_storage,
        auth_provider.clone(),
        WebsocketSettings::default(),
        Vec::new(),
    )
    .expect("Failed to bind to address.");

    // Execute the server in the background
    tokio::spawn(server);

    TestApp {
        address: format!("127.0.0.1:{port}"),
        ws_dispatch,
        auth_provider,
    }
}

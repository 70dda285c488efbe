// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::Deserialize;

/// Configuration for the server.
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub websocket: WebsocketSettings,
}

/// Configuration for the application.
#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub port: u16,
    pub host: String,
    /// Origins allowed to call the HTTP surface from a browser context.
    /// Empty means same-origin defaults only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Configuration for the database.
#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.name
        )
    }

    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token lifetimes of the identity adapter.
#[derive(Deserialize, Clone, Debug)]
pub struct AuthSettings {
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: u64,
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: default_access_token_lifetime(),
            refresh_token_lifetime_secs: default_refresh_token_lifetime(),
        }
    }
}

fn default_access_token_lifetime() -> u64 {
    900
}

fn default_refresh_token_lifetime() -> u64 {
    60 * 60 * 24 * 30
}

/// Configuration for the live-stream hub.
#[derive(Deserialize, Clone, Debug)]
pub struct WebsocketSettings {
    /// Bounded event buffer per live connection. A connection whose buffer is
    /// full is dropped instead of stalling the dispatcher.
    #[serde(default = "default_send_buffer")]
    pub connection_send_buffer: usize,
    /// Clients keep sockets open for days; this timeout only reaps peers
    /// that stopped answering pings.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for WebsocketSettings {
    fn default() -> Self {
        Self {
            connection_send_buffer: default_send_buffer(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

fn default_send_buffer() -> usize {
    16
}

fn default_idle_timeout() -> u64 {
    60 * 60 * 24 * 2
}

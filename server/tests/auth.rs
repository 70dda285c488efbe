// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde_json::{json, Value};

use kftest_harness::utils::spawn_app;
use kftypes::identifiers::UserId;

#[actix_rt::test]
async fn refresh_rotates_the_token_pair() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/auth/refresh", app.address))
        .json(&json!({ "refresh_token": tokens.refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Invalid refresh body.");
    let new_access = body["access_token"].as_str().expect("Missing access token.");
    let new_refresh = body["refresh_token"]
        .as_str()
        .expect("Missing refresh token.");
    assert_ne!(new_access, tokens.access_token);
    assert_ne!(new_refresh, tokens.refresh_token);

    // The fresh access token verifies.
    let response = reqwest::Client::new()
        .get(format!("http://{}/sync/manifest?zone=default", app.address))
        .bearer_auth(new_access)
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
}

#[actix_rt::test]
async fn replayed_refresh_token_is_rejected() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/auth/refresh", app.address))
        .json(&json!({ "refresh_token": tokens.refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());

    // The old refresh token was revoked on use.
    let response = client
        .post(format!("http://{}/auth/refresh", app.address))
        .json(&json!({ "refresh_token": tokens.refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.expect("Invalid error body.");
    assert_eq!(body["error"], "unauthenticated");
}

#[actix_rt::test]
async fn unknown_access_token_is_rejected() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/sync/manifest?zone=default", app.address))
        .bearer_auth("not-a-token")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 401);
}

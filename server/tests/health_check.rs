// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use kftest_harness::utils::spawn_app;

#[actix_rt::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Invalid body.");
    assert_eq!(body["status"], "ok");
}

// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use kfbackend::sync::digest::{leaf_digest, LeafDigest};
use kftest_harness::utils::{spawn_app, TestApp};
use kftypes::identifiers::UserId;

fn key_json(item_uuid: &str) -> Value {
    json!({
        "item_uuid": item_uuid,
        "key_class": "symmetric",
        "key_type": "aes-gcm-256",
        "data": STANDARD.encode([0xaa; 32]),
        "access_group": "default",
        "usage_flags": ["wrap", "unwrap"],
    })
}

fn metadata_json(item_uuid: &str, password_key_uuid: &str) -> Value {
    json!({
        "item_uuid": item_uuid,
        "server": "github.com",
        "account": "alice",
        "protocol": "https",
        "port": 443,
        "access_group": "default",
        "password_key_uuid": password_key_uuid,
    })
}

fn record_json(item_uuid: &str, parent_key_uuid: &str) -> Value {
    json!({
        "item_uuid": item_uuid,
        "parent_key_uuid": parent_key_uuid,
        "wrapped_key": STANDARD.encode([0x11; 48]),
        "enc_item": STANDARD.encode([0x22; 128]),
        "enc_version": 1,
    })
}

async fn manifest(app: &TestApp, token: &str) -> Value {
    let response = reqwest::Client::new()
        .get(format!("http://{}/sync/manifest?zone=default", app.address))
        .bearer_auth(token)
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    response.json().await.expect("Invalid manifest body.")
}

async fn push(app: &TestApp, token: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/sync/push", app.address))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.")
}

async fn pull(app: &TestApp, token: &str, last_gencount: i64, include_tombstoned: bool) -> Value {
    let response = reqwest::Client::new()
        .post(format!("http://{}/sync/pull", app.address))
        .bearer_auth(token)
        .json(&json!({
            "zone": "default",
            "last_gencount": last_gencount,
            "include_tombstoned": include_tombstoned,
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    response.json().await.expect("Invalid pull body.")
}

/// Pushes one key, one metadata and one sync record, all linked via `k1`.
async fn push_initial_vault(app: &TestApp, token: &str) -> Value {
    let response = push(
        app,
        token,
        json!({
            "zone": "default",
            "keys": [key_json("k1")],
            "credential_metadata": [metadata_json("m1", "k1")],
            "sync_records": [record_json("r1", "k1")],
        }),
    )
    .await;
    assert!(response.status().is_success());
    response.json().await.expect("Invalid push body.")
}

#[actix_rt::test]
async fn fresh_manifest_is_the_zero_state() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;

    let manifest = manifest(&app, &tokens.access_token).await;
    assert_eq!(manifest["zone"], "default");
    assert_eq!(manifest["gencount"], 0);
    assert_eq!(manifest["digest"], LeafDigest::empty().encode());
}

#[actix_rt::test]
async fn requests_without_credential_are_rejected() {
    let app = spawn_app().await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/sync/manifest?zone=default", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.expect("Invalid error body.");
    assert_eq!(body["error"], "unauthenticated");
}

#[actix_rt::test]
async fn empty_zone_parameter_is_rejected() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/sync/manifest?zone=", app.address))
        .bearer_auth(&tokens.access_token)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.expect("Invalid error body.");
    assert_eq!(body["error"], "invalid_request");
}

#[actix_rt::test]
async fn first_push_assigns_gencounts_and_digest() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;

    let body = push_initial_vault(&app, &tokens.access_token).await;
    assert_eq!(body["gencount"], 3);
    assert_eq!(body["processed_count"], 3);
    assert_eq!(body["digest"], leaf_digest(["r1"]).encode());
    assert_eq!(body["conflicts"], json!([]));

    // The manifest reflects the committed state.
    let manifest = manifest(&app, &tokens.access_token).await;
    assert_eq!(manifest["gencount"], 3);
    assert_eq!(manifest["digest"], leaf_digest(["r1"]).encode());
}

#[actix_rt::test]
async fn delta_pull_returns_only_newer_records() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;
    push_initial_vault(&app, &tokens.access_token).await;

    let body = pull(&app, &tokens.access_token, 0, false).await;
    assert_eq!(body["gencount"], 3);
    assert_eq!(body["keys"][0]["item_uuid"], "k1");
    assert_eq!(body["keys"][0]["gencount"], 1);
    assert_eq!(body["credential_metadata"][0]["item_uuid"], "m1");
    assert_eq!(body["credential_metadata"][0]["gencount"], 2);
    assert_eq!(body["sync_records"][0]["item_uuid"], "r1");
    assert_eq!(body["sync_records"][0]["gencount"], 3);

    // Nothing above gencount 3 yet.
    let body = pull(&app, &tokens.access_token, 3, false).await;
    assert_eq!(body["gencount"], 3);
    assert_eq!(body["keys"], json!([]));
    assert_eq!(body["credential_metadata"], json!([]));
    assert_eq!(body["sync_records"], json!([]));
}

#[actix_rt::test]
async fn tombstone_shrinks_the_digest() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;
    push_initial_vault(&app, &tokens.access_token).await;

    let mut tombstone = record_json("r1", "k1");
    tombstone["tombstone"] = json!(true);
    let response = push(
        &app,
        &tokens.access_token,
        json!({ "zone": "default", "sync_records": [tombstone] }),
    )
    .await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Invalid push body.");
    assert_eq!(body["gencount"], 4);
    assert_eq!(body["digest"], LeafDigest::empty().encode());

    // Default pulls hide the tombstone...
    let body = pull(&app, &tokens.access_token, 3, false).await;
    assert_eq!(body["sync_records"], json!([]));

    // ...but peers still learn of the deletion when they ask.
    let body = pull(&app, &tokens.access_token, 3, true).await;
    assert_eq!(body["sync_records"][0]["item_uuid"], "r1");
    assert_eq!(body["sync_records"][0]["tombstone"], true);
    assert_eq!(body["sync_records"][0]["gencount"], 4);
}

#[actix_rt::test]
async fn unknown_parent_key_reference_is_rejected() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;

    let response = push(
        &app,
        &tokens.access_token,
        json!({ "zone": "default", "sync_records": [record_json("r1", "kX")] }),
    )
    .await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.expect("Invalid error body.");
    assert_eq!(body["error"], "invalid_reference");

    // Nothing of the rejected batch is visible afterwards.
    let manifest = manifest(&app, &tokens.access_token).await;
    assert_eq!(manifest["gencount"], 0);
    assert_eq!(manifest["digest"], LeafDigest::empty().encode());
}

#[actix_rt::test]
async fn batch_local_key_satisfies_a_reference() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;

    // `r1` references `k1` from the same batch; no key is stored yet.
    let response = push(
        &app,
        &tokens.access_token,
        json!({
            "zone": "default",
            "keys": [key_json("k1")],
            "sync_records": [record_json("r1", "k1")],
        }),
    )
    .await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Invalid push body.");
    assert_eq!(body["gencount"], 2);
}

#[actix_rt::test]
async fn users_are_isolated() {
    let app = spawn_app().await;
    let alice = app.issue_tokens(&UserId::random()).await;
    let bob = app.issue_tokens(&UserId::random()).await;

    push_initial_vault(&app, &alice.access_token).await;

    // Bob reuses the same item_uuids plus one extra record of his own.
    let response = push(
        &app,
        &bob.access_token,
        json!({
            "zone": "default",
            "keys": [key_json("k1")],
            "sync_records": [record_json("r1", "k1"), record_json("r2", "k1")],
        }),
    )
    .await;
    assert!(response.status().is_success());

    let alice_manifest = manifest(&app, &alice.access_token).await;
    let bob_manifest = manifest(&app, &bob.access_token).await;
    assert_eq!(alice_manifest["gencount"], 3);
    assert_eq!(bob_manifest["gencount"], 3);
    assert_eq!(alice_manifest["digest"], leaf_digest(["r1"]).encode());
    assert_eq!(bob_manifest["digest"], leaf_digest(["r1", "r2"]).encode());
    assert_ne!(alice_manifest["digest"], bob_manifest["digest"]);

    // Alice's pull never contains Bob's records.
    let body = pull(&app, &alice.access_token, 0, true).await;
    assert_eq!(body["sync_records"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["credential_metadata"].as_array().map(Vec::len), Some(1));
}

#[actix_rt::test]
async fn repeated_push_is_idempotent_except_for_the_gencount() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;

    push_initial_vault(&app, &tokens.access_token).await;
    let body = push_initial_vault(&app, &tokens.access_token).await;
    assert_eq!(body["gencount"], 6);
    // The leaf set is unchanged, so the digest is too.
    assert_eq!(body["digest"], leaf_digest(["r1"]).encode());

    // Still exactly one record per layer.
    let body = pull(&app, &tokens.access_token, 0, true).await;
    assert_eq!(body["keys"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["credential_metadata"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["sync_records"].as_array().map(Vec::len), Some(1));
}

#[actix_rt::test]
async fn bulk_delete_tombstones_every_record() {
    let app = spawn_app().await;
    let tokens = app.issue_tokens(&UserId::random()).await;
    push_initial_vault(&app, &tokens.access_token).await;

    let response = reqwest::Client::new()
        .delete(format!("http://{}/sync/credentials?zone=default", app.address))
        .bearer_auth(&tokens.access_token)
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Invalid delete body.");
    // The gencount advances once per tombstoned record.
    assert_eq!(body["deleted"], 3);
    assert_eq!(body["gencount"], 6);

    let manifest = manifest(&app, &tokens.access_token).await;
    assert_eq!(manifest["digest"], LeafDigest::empty().encode());

    // Every record is still stored, tombstoned, above the old gencount.
    let body = pull(&app, &tokens.access_token, 3, true).await;
    assert_eq!(body["keys"][0]["tombstone"], true);
    assert_eq!(body["credential_metadata"][0]["tombstone"], true);
    assert_eq!(body["sync_records"][0]["tombstone"], true);

    // Default pulls see an empty vault.
    let body = pull(&app, &tokens.access_token, 0, false).await;
    assert_eq!(body["keys"], json!([]));
    assert_eq!(body["sync_records"], json!([]));
}

// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::StreamExt;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use kfbackend::sync::{CredentialsChanged, SyncNotifier};
use kftest_harness::utils::{spawn_app, TestApp};
use kftypes::identifiers::{UserId, ZoneId};
use kftypes::messages::sync::LiveEvent;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect_live(app: &TestApp, access_token: &str) -> WsStream {
    let url = format!("ws://{}/sync/ws?token={}", app.address, access_token);
    let (stream, _response) = connect_async(url)
        .await
        .expect("Failed to open websocket.");
    stream
}

/// Registration happens when the connection actor starts, slightly after
/// the upgrade response. Probe with zero-gencount events until one is
/// accepted; the probes are filtered out by the readers below.
async fn wait_until_registered(app: &TestApp, user_id: UserId) {
    loop {
        let probe = CredentialsChanged {
            user_id,
            zone: ZoneId::default(),
            gencount: 0,
            timestamp: 0,
        };
        if app.ws_dispatch.notify(probe).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Reads frames until a non-probe event arrives, skipping protocol pings.
async fn next_event(stream: &mut WsStream) -> LiveEvent {
    let read = async {
        while let Some(frame) = stream.next().await {
            if let Message::Text(text) = frame.expect("Websocket failure.") {
                let event: LiveEvent =
                    serde_json::from_str(&text).expect("Invalid live event.");
                let LiveEvent::CredentialsChanged { gencount, .. } = &event;
                if *gencount > 0 {
                    return event;
                }
            }
        }
        panic!("Websocket closed before an event arrived.");
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("No live event within the deadline.")
}

async fn push_one_record(app: &TestApp, access_token: &str) {
    let response = reqwest::Client::new()
        .post(format!("http://{}/sync/push", app.address))
        .bearer_auth(access_token)
        .json(&json!({
            "zone": "default",
            "keys": [{
                "item_uuid": "k1",
                "key_class": "symmetric",
                "key_type": "aes-gcm-256",
                "data": STANDARD.encode([0xaa; 32]),
                "access_group": "default",
                "usage_flags": ["wrap", "unwrap"],
            }],
            "sync_records": [{
                "item_uuid": "r1",
                "parent_key_uuid": "k1",
                "wrapped_key": STANDARD.encode([0x11; 48]),
                "enc_item": STANDARD.encode([0x22; 128]),
                "enc_version": 1,
            }],
        }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
}

#[actix_rt::test]
async fn live_stream_delivers_change_events() {
    let app = spawn_app().await;
    let user_id = UserId::random();
    let tokens = app.issue_tokens(&user_id).await;

    // One device listens...
    let mut stream = connect_live(&app, &tokens.access_token).await;
    wait_until_registered(&app, user_id).await;

    // ...while a second device pushes a change.
    push_one_record(&app, &tokens.access_token).await;

    let LiveEvent::CredentialsChanged {
        user_id: event_user,
        zone,
        gencount,
        timestamp,
    } = next_event(&mut stream).await;
    assert_eq!(event_user, user_id);
    assert_eq!(zone, ZoneId::default());
    assert_eq!(gencount, 2);
    assert!(timestamp > 0);
}

#[actix_rt::test]
async fn live_stream_is_scoped_to_the_user() {
    let app = spawn_app().await;
    let alice_id = UserId::random();
    let bob_id = UserId::random();
    let alice = app.issue_tokens(&alice_id).await;
    let bob = app.issue_tokens(&bob_id).await;

    let mut bob_stream = connect_live(&app, &bob.access_token).await;
    wait_until_registered(&app, bob_id).await;

    // Alice's push must never reach Bob's connection.
    push_one_record(&app, &alice.access_token).await;

    let leaked = tokio::time::timeout(Duration::from_millis(500), async {
        while let Some(frame) = bob_stream.next().await {
            if let Ok(Message::Text(text)) = frame {
                let LiveEvent::CredentialsChanged { user_id, .. } =
                    serde_json::from_str(&text).expect("Invalid live event.");
                if user_id == alice_id {
                    return true;
                }
            }
        }
        false
    })
    .await;
    assert!(
        matches!(leaked, Err(_) | Ok(false)),
        "event leaked across users"
    );
}

#[actix_rt::test]
async fn live_stream_upgrade_requires_a_credential() {
    let app = spawn_app().await;

    let url = format!("ws://{}/sync/ws", app.address);
    assert!(connect_async(url).await.is_err());
}

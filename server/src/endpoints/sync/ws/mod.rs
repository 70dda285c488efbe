// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

pub(crate) mod dispatch;
pub(crate) mod messages;

use actix::{
    clock::Instant, fut, Actor, ActorContext, ActorFutureExt, Addr, AsyncContext,
    ContextFutureSpawner, Running, StreamHandler, WrapFuture,
};
use actix_web::web::{self, Data};
use actix_web::{HttpRequest, HttpResponse};
use actix_web_actors::ws;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use kfbackend::auth::{storage_provider_trait::AuthStorageProvider, AuthProvider};
use kfbackend::settings::WebsocketSettings;
use kfbackend::sync::{CredentialsChanged, NotifierError, SyncNotifier};
use kftypes::identifiers::{UserId, ZoneId};
use kftypes::messages::sync::LiveEvent;

use crate::endpoints::{bearer_token, ApiError};
use dispatch::Dispatch;
use messages::{Connect, Disconnect, NotifyUser};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// Type for internal use, so the event stream has its own item type.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct InternalLiveEvent {
    inner: LiveEvent,
}

impl From<LiveEvent> for InternalLiveEvent {
    fn from(event: LiveEvent) -> Self {
        InternalLiveEvent { inner: event }
    }
}

/// The websocket actor. It handles one live connection and its lifecycle:
/// accept, register, forward events until disconnect or send-buffer
/// overflow, unregister, close.
///
/// Events arrive over a bounded channel whose sender lives in the dispatch
/// registry. When dispatch drops the sender (buffer overflow or shutdown)
/// the stream ends and the actor stops, closing the socket; the client
/// reconnects and recovers by pulling.
struct SyncWsConnection {
    connection_id: Uuid,
    user_id: UserId,
    zone: ZoneId,
    heartbeat: Instant,
    client_timeout: Duration,
    dispatch_addr: Addr<Dispatch>,
    event_sender: Option<mpsc::Sender<InternalLiveEvent>>,
    event_stream: Option<mpsc::Receiver<InternalLiveEvent>>,
}

impl SyncWsConnection {
    fn new(
        user_id: UserId,
        zone: ZoneId,
        dispatch_addr: Addr<Dispatch>,
        settings: &WebsocketSettings,
    ) -> Self {
        let (event_sender, event_stream) = mpsc::channel(settings.connection_send_buffer);
        SyncWsConnection {
            connection_id: Uuid::new_v4(),
            user_id,
            zone,
            heartbeat: Instant::now(),
            client_timeout: Duration::from_secs(settings.idle_timeout_secs),
            dispatch_addr,
            event_sender: Some(event_sender),
            event_stream: Some(event_stream),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.heartbeat) > act.client_timeout {
                tracing::info!("Disconnecting websocket because heartbeat failed");
                act.dispatch_addr.do_send(Disconnect {
                    connection_id: act.connection_id,
                    user_id: act.user_id,
                });
                ctx.stop();
                return;
            }

            ctx.ping(b"keyfold");
        });
    }
}

impl Actor for SyncWsConnection {
    type Context = ws::WebsocketContext<Self>;

    /// Called on actor start: wire up the event stream, start the heartbeat
    /// and register with dispatch.
    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);

        if let Some(event_stream) = self.event_stream.take() {
            ctx.add_stream(ReceiverStream::new(event_stream));
        }
        let Some(events) = self.event_sender.take() else {
            ctx.stop();
            return;
        };

        // Register the connection with dispatch
        self.dispatch_addr
            .send(Connect {
                connection_id: self.connection_id,
                user_id: self.user_id,
                zone: self.zone.clone(),
                events,
            })
            .into_actor(self)
            .then(|res, _, ctx| {
                match res {
                    Ok(_res) => (),
                    // If we can't register the connection, stop the actor
                    _ => {
                        tracing::error!("Error registering connection with dispatch");
                        ctx.stop()
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    /// Called when the actor is dropped.
    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.dispatch_addr.do_send(Disconnect {
            connection_id: self.connection_id,
            user_id: self.user_id,
        });
        Running::Stop
    }
}

/// Handler for ws::Message message
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SyncWsConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        if let Ok(ws_msg) = msg {
            match ws_msg {
                ws::Message::Ping(bytes) => {
                    self.heartbeat = Instant::now();
                    ctx.pong(&bytes);
                }
                ws::Message::Pong(bytes) => {
                    self.heartbeat = Instant::now();
                    tracing::trace!("Received a pong: {:?}", bytes);
                }
                ws::Message::Close(close_reason) => {
                    tracing::trace!("Received a close: {:?}", close_reason);
                    self.dispatch_addr.do_send(Disconnect {
                        connection_id: self.connection_id,
                        user_id: self.user_id,
                    });
                    ctx.stop()
                }
                // The live stream is server-to-client; client payloads are
                // ignored.
                ws::Message::Text(_) | ws::Message::Binary(_) => {
                    tracing::trace!("Ignoring client payload on live stream");
                }
                ws::Message::Continuation(_) => {
                    tracing::trace!("Continuation message received");
                    ctx.stop();
                }
                _ => {
                    tracing::warn!("Unknown message received");
                }
            };
        }
    }
}

/// Handler for live events fanned out by the dispatch actor. When the
/// stream ends (dispatch dropped the sender), the default `finished`
/// implementation stops the actor and with it the connection.
impl StreamHandler<InternalLiveEvent> for SyncWsConnection {
    fn handle(&mut self, event: InternalLiveEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&event.inner) {
            Ok(serialized) => ctx.text(serialized),
            Err(error) => tracing::error!(%error, "failed to serialize live event"),
        }
    }
}

/// Query parameters of the live-stream upgrade.
#[derive(Deserialize)]
pub(crate) struct LiveQuery {
    #[serde(default)]
    zone: ZoneId,
    token: Option<String>,
}

/// Upgrade a HTTP connection to a WebSocket connection.
///
/// Some upgrade transports cannot set custom headers, so the bearer may
/// arrive in the `Authorization` header or the `token` query parameter;
/// both are validated identically.
#[tracing::instrument(
    name = "Upgrade connection to web socket",
    skip(req, stream, query, auth_provider, dispatch_data, ws_settings)
)]
pub(crate) async fn upgrade_connection<A: AuthStorageProvider>(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<LiveQuery>,
    auth_provider: Data<AuthProvider<A>>,
    dispatch_data: Data<DispatchNotifier>,
    ws_settings: Data<WebsocketSettings>,
) -> Result<HttpResponse, ApiError> {
    let token = bearer_token(&req)
        .or(query.token.as_deref())
        .ok_or_else(ApiError::unauthenticated)?;
    let user_id = auth_provider.verify(token).await?;

    let connection = SyncWsConnection::new(
        user_id,
        query.zone.clone(),
        dispatch_data.get_ref().dispatch_addr.clone(),
        ws_settings.get_ref(),
    );

    tracing::trace!("Upgrading HTTP connection to websocket connection...");
    ws::start(connection, &req, stream).map_err(|error| {
        tracing::warn!(%error, "Error upgrading connection");
        ApiError::invalid_request("websocket upgrade failed")
    })
}

/// This is a wrapper for the dispatch actor that can be used to send out a
/// notification over the dispatch.
#[derive(Clone, Debug)]
pub struct DispatchNotifier {
    pub dispatch_addr: Addr<Dispatch>,
}

impl DispatchNotifier {
    /// Create a new instance
    pub fn new(dispatch_addr: Addr<Dispatch>) -> Self {
        DispatchNotifier { dispatch_addr }
    }

    /// Create a new instance backed by a freshly started dispatch actor.
    pub fn default_addr() -> Self {
        let dispatch: Addr<Dispatch> = Dispatch::default().start();
        DispatchNotifier {
            dispatch_addr: dispatch,
        }
    }
}

#[async_trait]
impl SyncNotifier for DispatchNotifier {
    /// Notify the live connections of the event's user.
    ///
    /// Returns `()` if at least one connection accepted the event and
    /// [`NotifierError::ClientNotFound`] if none did.
    async fn notify(&self, event: CredentialsChanged) -> Result<(), NotifierError> {
        self.dispatch_addr
            .send(NotifyUser {
                event: LiveEvent::from(event),
            })
            .await
            // If the actor doesn't reply, we get a MailboxError
            .map_err(|error| {
                tracing::warn!(%error, "dispatch actor did not answer");
                NotifierError::DispatcherUnavailable
            })
            .and_then(|res| res.map_err(|_| NotifierError::ClientNotFound))
    }
}

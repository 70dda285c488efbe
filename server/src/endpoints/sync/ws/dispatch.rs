// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;

use actix::prelude::{Actor, Context, Handler};
use actix::ResponseFuture;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use kftypes::identifiers::{UserId, ZoneId};
use kftypes::messages::sync::LiveEvent;

use super::messages::{Connect, Disconnect, NotifyMessageError, NotifyUser};
use super::InternalLiveEvent;

struct Session {
    zone: ZoneId,
    events: mpsc::Sender<InternalLiveEvent>,
}

/// Dispatch for all live connections. It owns the per-user registry
/// exclusively (its mailbox is the command channel) and fans change
/// events out to every connection of the affected user and zone.
///
/// A broadcast to one connection never blocks the others: events go through
/// `try_send` on the connection's bounded channel, and a connection whose
/// buffer is full is dropped from the registry. Dropping the sender ends
/// the connection actor's event stream, which closes the socket; the client
/// reconnects and recovers by pulling.
#[derive(Default)]
pub struct Dispatch {
    sessions: HashMap<UserId, HashMap<Uuid, Session>>,
}

impl Dispatch {
    fn broadcast(&mut self, event: LiveEvent) -> Result<(), NotifyMessageError> {
        let LiveEvent::CredentialsChanged { user_id, zone, .. } = &event;
        let user_id = *user_id;
        let zone = zone.clone();

        let Some(connections) = self.sessions.get_mut(&user_id) else {
            return Err(NotifyMessageError::NoLiveConnections);
        };

        let mut delivered = 0usize;
        let mut dropped = Vec::new();
        for (connection_id, session) in connections.iter() {
            if session.zone != zone {
                continue;
            }
            match session
                .events
                .try_send(InternalLiveEvent::from(event.clone()))
            {
                Ok(()) => delivered += 1,
                // Full buffer or gone consumer: drop the session instead of
                // stalling the dispatcher.
                Err(_) => dropped.push(*connection_id),
            }
        }

        for connection_id in dropped {
            if connections.remove(&connection_id).is_some() {
                info!(%connection_id, "dropping live connection: send buffer exhausted");
            }
        }
        if connections.is_empty() {
            self.sessions.remove(&user_id);
        }

        if delivered == 0 {
            Err(NotifyMessageError::NoLiveConnections)
        } else {
            Ok(())
        }
    }
}

// Makes Dispatch an Actor
impl Actor for Dispatch {
    type Context = Context<Self>;
}

// Handle Connect messages
impl Handler<Connect> for Dispatch {
    type Result = ();

    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) -> Self::Result {
        self.sessions.entry(msg.user_id).or_default().insert(
            msg.connection_id,
            Session {
                zone: msg.zone,
                events: msg.events,
            },
        );
    }
}

// Handle Disconnect messages
impl Handler<Disconnect> for Dispatch {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        if let Some(connections) = self.sessions.get_mut(&msg.user_id) {
            connections.remove(&msg.connection_id);
            if connections.is_empty() {
                self.sessions.remove(&msg.user_id);
            }
        }
    }
}

// Handle NotifyUser messages
impl Handler<NotifyUser> for Dispatch {
    type Result = ResponseFuture<Result<(), NotifyMessageError>>;

    fn handle(&mut self, msg: NotifyUser, _ctx: &mut Context<Self>) -> Self::Result {
        let result = self.broadcast(msg.event);
        Box::pin(async move { result })
    }
}

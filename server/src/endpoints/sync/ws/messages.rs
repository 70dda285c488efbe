// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use actix::prelude::Message;
use tokio::sync::mpsc;
use uuid::Uuid;

use kftypes::identifiers::{UserId, ZoneId};
use kftypes::messages::sync::LiveEvent;

use super::InternalLiveEvent;

/// Connect message for the [`Dispatch`](super::dispatch::Dispatch) actor.
/// Carries the bounded sender of the connection's event channel.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub connection_id: Uuid,
    pub user_id: UserId,
    pub zone: ZoneId,
    pub events: mpsc::Sender<InternalLiveEvent>,
}

/// Disconnect message for the [`Dispatch`](super::dispatch::Dispatch) actor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub connection_id: Uuid,
    pub user_id: UserId,
}

#[derive(Debug)]
pub enum NotifyMessageError {
    NoLiveConnections,
}

/// Broadcast message for the [`Dispatch`](super::dispatch::Dispatch) actor.
/// This message has a custom return value because it needs to return a
/// `Result`.
#[derive(Message)]
#[rtype(result = "Result<(), NotifyMessageError>")]
pub struct NotifyUser {
    pub event: LiveEvent,
}

// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire messages of the sync and auth surfaces.

pub mod auth;
pub mod sync;

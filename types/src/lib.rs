// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Types shared between the Keyfold server and its clients: identifiers,
//! endpoint paths, wire messages and the error taxonomy of the sync API.

pub mod codec;
pub mod endpoint_paths;
pub mod errors;
pub mod identifiers;
pub mod keys;
pub mod messages;

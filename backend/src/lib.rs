// SPDX-FileCopyrightText: 2025 Keyfold Developers <hello@keyfold.dev>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Domain logic of the Keyfold credential synchronization server: the
//! multi-tenant sync engine, the storage-provider seams and the identity
//! adapter. Transport and persistence live in the server crate.

pub mod auth;
pub mod errors;
pub mod settings;
pub mod sync;

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Specification Generation Module
//!
//! Generates the JSON Schema of link definitions so that links exported from
//! one session can be validated before they are fed into another one.

pub mod link_schema;

pub use link_schema::generate_link_schema;

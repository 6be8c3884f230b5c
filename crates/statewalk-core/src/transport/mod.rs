// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport module - request execution backends.

#[cfg(feature = "http")]
pub mod http;
pub mod mock;
mod traits;

#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use mock::MockTransport;
pub use traits::*;

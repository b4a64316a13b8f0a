// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Long-lived list+watch sessions with backoff and resync.

pub mod backoff;
pub mod session;

pub use backoff::Backoff;
pub use session::{EventStream, SessionState, WatchHandle, WatchSession};

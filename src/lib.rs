// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod informer;
pub mod kubernetes;
pub mod types;
pub mod wait;
pub mod watch;

#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result, WaitError};
pub use informer::Informer;
pub use types::{ChangeEvent, ListFilter, ResourceKey, ResourceSnapshot};
pub use wait::ConditionWaiter;
pub use watch::WatchSession;

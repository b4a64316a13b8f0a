// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Core data model: keys, snapshots, change events and list filters.

pub mod event;
pub mod filter;
pub mod key;

pub use event::{ChangeEvent, EventKind, ResourceSnapshot, SessionEvent, WatchedResource};
pub use filter::ListFilter;
pub use key::{ResourceKey, ResourceVersion};

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Local cache of the latest known snapshot per resource.

pub mod store;

pub use store::CacheStore;

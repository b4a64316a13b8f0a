// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Informers: a cache store kept in sync by a watch session, plus consumers.

pub mod shared;
pub mod subscription;

pub use shared::{wait_for_cache_sync, CacheSync, Informer};
pub use subscription::{HandlerId, Subscription};

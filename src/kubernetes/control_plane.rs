// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The primitives the engine needs from a cluster control plane.

use crate::error::Result;
use crate::types::ListFilter;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Result of a list call: the items and the collection version to watch from.
#[derive(Debug, Clone)]
pub struct Listing<K> {
    pub items: Vec<K>,
    pub resource_version: String,
}

/// A single item of a raw watch stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    /// Progress marker carrying only a newer resource version.
    Bookmark(String),
}

/// Raw watch stream. Ending the stream means the server closed the connection;
/// `Err(Error::StaleResourceVersion)` means the requested version has expired.
pub type WatchStream<K> = BoxStream<'static, Result<RawEvent<K>>>;

/// List/watch/get/create/delete for one resource type.
#[async_trait]
pub trait ControlPlane<K>: Send + Sync + 'static {
    async fn list(&self, filter: &ListFilter) -> Result<Listing<K>>;

    async fn watch(&self, filter: &ListFilter, resource_version: &str) -> Result<WatchStream<K>>;

    /// `Ok(None)` when the resource does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create(&self, namespace: &str, obj: &K) -> Result<K>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

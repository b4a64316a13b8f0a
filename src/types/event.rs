// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Snapshots and the change events that carry them.

use crate::error::Error;
use crate::types::key::{ResourceKey, ResourceVersion};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

/// Resource types the engine can watch.
pub trait WatchedResource:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + Send + Sync + 'static
{
}

impl<T> WatchedResource for T where
    T: Resource<DynamicType = ()> + Clone + Debug + Serialize + Send + Sync + 'static
{
}

/// Immutable, versioned copy of a resource at one point in time.
///
/// Cloning is cheap; the object itself is shared.
#[derive(Debug)]
pub struct ResourceSnapshot<K> {
    key: ResourceKey,
    resource_version: Option<ResourceVersion>,
    object: Arc<K>,
}

impl<K: Resource<DynamicType = ()>> ResourceSnapshot<K> {
    pub fn new(object: K) -> Self {
        Self::from_arc(Arc::new(object))
    }

    pub fn from_arc(object: Arc<K>) -> Self {
        Self {
            key: ResourceKey::from_resource(object.as_ref()),
            resource_version: object.resource_version().map(ResourceVersion::from),
            object,
        }
    }
}

impl<K> ResourceSnapshot<K> {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn resource_version(&self) -> Option<&ResourceVersion> {
        self.resource_version.as_ref()
    }

    pub fn object(&self) -> &K {
        &self.object
    }

    pub fn into_inner(self) -> Arc<K> {
        self.object
    }

    /// Whether this snapshot carries a different version than `other`.
    pub fn differs_from(&self, other: &Self) -> bool {
        self.resource_version != other.resource_version
    }
}

impl<K> Clone for ResourceSnapshot<K> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            resource_version: self.resource_version.clone(),
            object: Arc::clone(&self.object),
        }
    }
}

impl<K: PartialEq> PartialEq for ResourceSnapshot<K> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.resource_version == other.resource_version
            && self.object == other.object
    }
}

impl<K> Deref for ResourceSnapshot<K> {
    type Target = K;

    fn deref(&self) -> &K {
        &self.object
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

/// One observed mutation of a resource.
///
/// `Error` carries no snapshot and must never be applied to a cache.
#[derive(Debug)]
pub enum ChangeEvent<K> {
    Added(ResourceSnapshot<K>),
    Modified(ResourceSnapshot<K>),
    Deleted(ResourceSnapshot<K>),
    Error(Error),
}

impl<K> ChangeEvent<K> {
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::Added(_) => EventKind::Added,
            ChangeEvent::Modified(_) => EventKind::Modified,
            ChangeEvent::Deleted(_) => EventKind::Deleted,
            ChangeEvent::Error(_) => EventKind::Error,
        }
    }

    pub fn snapshot(&self) -> Option<&ResourceSnapshot<K>> {
        match self {
            ChangeEvent::Added(s) | ChangeEvent::Modified(s) | ChangeEvent::Deleted(s) => Some(s),
            ChangeEvent::Error(_) => None,
        }
    }

    pub fn key(&self) -> Option<&ResourceKey> {
        self.snapshot().map(ResourceSnapshot::key)
    }

    pub fn resource_version(&self) -> Option<&ResourceVersion> {
        self.snapshot().and_then(ResourceSnapshot::resource_version)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ChangeEvent::Error(_))
    }
}

impl<K> Clone for ChangeEvent<K> {
    fn clone(&self) -> Self {
        match self {
            ChangeEvent::Added(s) => ChangeEvent::Added(s.clone()),
            ChangeEvent::Modified(s) => ChangeEvent::Modified(s.clone()),
            ChangeEvent::Deleted(s) => ChangeEvent::Deleted(s.clone()),
            ChangeEvent::Error(e) => ChangeEvent::Error(e.clone()),
        }
    }
}

/// Items produced by a watch session.
#[derive(Debug)]
pub enum SessionEvent<K> {
    Change(ChangeEvent<K>),
    /// The events emitted since the last list reconcile the cache with it.
    /// Sent after the initial list and after every resync.
    Synced,
}

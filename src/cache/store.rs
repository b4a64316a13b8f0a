// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::{ChangeEvent, ResourceKey, ResourceSnapshot};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// Latest known snapshot for every observed key.
///
/// Only the owning informer writes to it, through [`CacheStore::apply`]. Each
/// apply happens under the write lock, so readers never see half an event.
pub struct CacheStore<K> {
    entries: RwLock<HashMap<ResourceKey, ResourceSnapshot<K>>>,
}

impl<K> Default for CacheStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> CacheStore<K> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ResourceKey, ResourceSnapshot<K>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ResourceKey, ResourceSnapshot<K>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn apply(&self, event: &ChangeEvent<K>) {
        match event {
            ChangeEvent::Added(snapshot) | ChangeEvent::Modified(snapshot) => {
                trace!("Storing {}", snapshot.key());
                self.write().insert(snapshot.key().clone(), snapshot.clone());
            }
            ChangeEvent::Deleted(snapshot) => {
                trace!("Removing {}", snapshot.key());
                self.write().remove(snapshot.key());
            }
            ChangeEvent::Error(_) => {}
        }
    }

    pub fn get(&self, key: &ResourceKey) -> Option<ResourceSnapshot<K>> {
        self.read().get(key).cloned()
    }

    /// Point-in-time copy of the snapshots accepted by `filter`.
    pub fn list(&self, filter: impl Fn(&ResourceSnapshot<K>) -> bool) -> Vec<ResourceSnapshot<K>> {
        self.read().values().filter(|s| filter(s)).cloned().collect()
    }

    pub fn list_all(&self) -> Vec<ResourceSnapshot<K>> {
        self.list(|_| true)
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

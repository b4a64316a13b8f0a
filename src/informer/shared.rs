// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Local cache kept current by a watch session, with event fan-out.

use crate::cache::CacheStore;
use crate::config::WatchConfig;
use crate::error::{Error, Result};
use crate::informer::subscription::{Handlers, HandlerId, SnapshotFilter, Subscription};
use crate::kubernetes::ControlPlane;
use crate::types::{ChangeEvent, ListFilter, ResourceSnapshot, SessionEvent, WatchedResource};
use crate::watch::{EventStream, WatchHandle, WatchSession};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Status {
    synced: bool,
    closed: bool,
}

/// Cache plus live synchronization for one resource type and filter.
///
/// A single background task owns the watch session; it applies every event to
/// the store first and only then hands it to registered consumers, one event
/// at a time.
pub struct Informer<K> {
    control_plane: Arc<dyn ControlPlane<K>>,
    filter: ListFilter,
    config: WatchConfig,
    store: Arc<CacheStore<K>>,
    handlers: Arc<Handlers<K>>,
    status: watch::Sender<Status>,
    token: Mutex<Option<CancellationToken>>,
}

impl<K: WatchedResource> Informer<K> {
    pub fn new(
        control_plane: Arc<dyn ControlPlane<K>>,
        filter: ListFilter,
        config: WatchConfig,
    ) -> Self {
        let (status, _) = watch::channel(Status::default());
        Self {
            control_plane,
            filter,
            config,
            store: Arc::new(CacheStore::new()),
            handlers: Arc::new(Handlers::new()),
            status,
            token: Mutex::new(None),
        }
    }

    /// Begin synchronizing in the background. Cancelling `parent` stops the
    /// informer. Calling it again while running has no effect.
    pub fn start(&self, parent: &CancellationToken) {
        let mut slot = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("Informer already started");
            return;
        }
        let token = parent.child_token();
        *slot = Some(token.clone());

        let session = WatchSession::new(
            self.control_plane.clone(),
            self.filter.clone(),
            self.config.clone(),
        );
        let (handle, stream) = session.start();
        let store = self.store.clone();
        let guard = CloseGuard {
            session: handle,
            status: self.status.clone(),
            handlers: self.handlers.clone(),
        };
        let span = tracing::info_span!(
            "informer",
            kind = %K::kind(&()),
            namespace = ?self.filter.namespace
        );

        tokio::spawn(
            async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => debug!("Informer stopped"),
                    _ = pump(stream, &store, &guard.handlers, &guard.status) => {
                        warn!("Informer watch session ended")
                    }
                }
                drop(guard);
            }
            .instrument(span),
        );
    }

    /// Stop synchronizing. Subscriptions end; the store keeps its last contents.
    pub fn stop(&self) {
        let slot = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = slot.as_ref() {
            token.cancel();
        }
    }

    /// Whether the initial list has been applied to the store.
    pub fn has_synced(&self) -> bool {
        self.status.borrow().synced
    }

    pub fn is_closed(&self) -> bool {
        self.status.borrow().closed
    }

    /// Wait until the initial list has been applied, or fail if the informer
    /// closes first.
    pub async fn wait_for_sync(&self) -> Result<()> {
        let mut status = self.status.subscribe();
        let reached = status
            .wait_for(|s| s.synced || s.closed)
            .await
            .map(|s| s.synced)
            .unwrap_or(false);
        if reached {
            Ok(())
        } else {
            Err(Error::Closed("informer closed before syncing".to_string()))
        }
    }

    /// Read-only view of the cache.
    pub fn store(&self) -> &CacheStore<K> {
        &self.store
    }

    pub fn filter(&self) -> &ListFilter {
        &self.filter
    }

    /// Invoke `callback` once per applied event on the informer task, after the
    /// store reflects it. Without a filter every event is delivered.
    pub fn add_event_handler<F, C>(&self, filter: Option<F>, callback: C) -> HandlerId
    where
        F: Fn(&ResourceSnapshot<K>) -> bool + Send + Sync + 'static,
        C: Fn(&ChangeEvent<K>) + Send + Sync + 'static,
    {
        self.handlers
            .add_callback(filter.map(|f| Arc::new(f) as SnapshotFilter<K>), Arc::new(callback))
    }

    pub fn remove_event_handler(&self, id: HandlerId) {
        self.handlers.remove(id);
    }

    /// Receive applied events through a stream instead of a callback.
    pub fn subscribe<F>(&self, filter: Option<F>) -> Subscription<K>
    where
        F: Fn(&ResourceSnapshot<K>) -> bool + Send + Sync + 'static,
    {
        self.handlers
            .subscribe(filter.map(|f| Arc::new(f) as SnapshotFilter<K>))
    }

    /// Registered callbacks and live subscriptions.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<K> Drop for Informer<K> {
    fn drop(&mut self) {
        if let Some(token) = self.token.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            token.cancel();
        }
    }
}

async fn pump<K>(
    mut stream: EventStream<K>,
    store: &CacheStore<K>,
    handlers: &Handlers<K>,
    status: &watch::Sender<Status>,
) {
    while let Some(item) = stream.next().await {
        match item {
            SessionEvent::Synced => {
                status.send_if_modified(|s| {
                    if s.synced {
                        return false;
                    }
                    info!("Informer synced with {} items", store.len());
                    s.synced = true;
                    true
                });
            }
            SessionEvent::Change(event) => {
                store.apply(&event);
                handlers.dispatch(&event);
            }
        }
    }
}

/// Shuts the informer down when its task ends, also when a handler panics.
struct CloseGuard<K> {
    session: WatchHandle,
    status: watch::Sender<Status>,
    handlers: Arc<Handlers<K>>,
}

impl<K> Drop for CloseGuard<K> {
    fn drop(&mut self) {
        self.session.stop();
        self.status.send_modify(|s| s.closed = true);
        self.handlers.close();
    }
}

/// Anything with an initial sync to wait for.
#[async_trait]
pub trait CacheSync: Send + Sync {
    fn has_synced(&self) -> bool;

    async fn wait_for_sync(&self) -> Result<()>;
}

#[async_trait]
impl<K: WatchedResource> CacheSync for Informer<K> {
    fn has_synced(&self) -> bool {
        Informer::has_synced(self)
    }

    async fn wait_for_sync(&self) -> Result<()> {
        Informer::wait_for_sync(self).await
    }
}

/// Wait until every informer has synced, failing if one closes first or the
/// token is cancelled.
pub async fn wait_for_cache_sync(
    informers: &[&dyn CacheSync],
    token: &CancellationToken,
) -> Result<()> {
    let all = futures::future::try_join_all(informers.iter().map(|i| i.wait_for_sync()));
    tokio::select! {
        _ = token.cancelled() => {
            Err(Error::Closed("cancelled while waiting for cache sync".to_string()))
        }
        result = all => result.map(|_| ()),
    }
}

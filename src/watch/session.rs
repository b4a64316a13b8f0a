// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! A self-healing list+watch subscription for one resource type and filter.

use crate::config::WatchConfig;
use crate::error::{Error, Result};
use crate::kubernetes::{ControlPlane, Listing, RawEvent};
use crate::types::{
    ChangeEvent, ListFilter, ResourceKey, ResourceSnapshot, SessionEvent, WatchedResource,
};
use crate::watch::backoff::Backoff;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listing,
    Watching,
    Resyncing,
    Closed,
}

/// Lists, then watches from the list's version, and relists whenever the watch
/// ends. Every relist is diffed against the last known state so that changes
/// missed while disconnected, deletions included, are emitted explicitly.
pub struct WatchSession<K> {
    control_plane: Arc<dyn ControlPlane<K>>,
    filter: ListFilter,
    config: WatchConfig,
    state: watch::Sender<SessionState>,
}

impl<K: WatchedResource> WatchSession<K> {
    pub fn new(
        control_plane: Arc<dyn ControlPlane<K>>,
        filter: ListFilter,
        config: WatchConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            control_plane,
            filter,
            config,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Spawn the session task and return its control handle and event stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> (WatchHandle, EventStream<K>) {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = WatchHandle {
            token: token.clone(),
            state: self.state.subscribe(),
        };

        let runner = Runner {
            backoff: Backoff::new(&self.config),
            control_plane: self.control_plane,
            filter: self.filter,
            state: self.state,
            tx,
            known: HashMap::new(),
            cursor: String::new(),
        };
        tokio::spawn(runner.run(token.clone()));

        (handle, EventStream { rx, token })
    }
}

/// Control handle of a running session.
#[derive(Clone)]
pub struct WatchHandle {
    token: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl WatchHandle {
    /// Stop the session and release its connection. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Resolves once the session task has finished.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }
}

/// Events of one session, ending when the session closes.
///
/// Dropping the stream stops the session.
pub struct EventStream<K> {
    rx: mpsc::UnboundedReceiver<SessionEvent<K>>,
    token: CancellationToken,
}

impl<K> Stream for EventStream<K> {
    type Item = SessionEvent<K>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.token.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

impl<K> Drop for EventStream<K> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Runner<K> {
    control_plane: Arc<dyn ControlPlane<K>>,
    filter: ListFilter,
    state: watch::Sender<SessionState>,
    tx: mpsc::UnboundedSender<SessionEvent<K>>,
    backoff: Backoff,
    /// Last snapshot seen per key, used to diff relists.
    known: HashMap<ResourceKey, ResourceSnapshot<K>>,
    /// Version to resume watching from.
    cursor: String,
}

impl<K: WatchedResource> Runner<K> {
    #[instrument(skip_all, fields(kind = %K::kind(&()), namespace = ?self.filter.namespace))]
    async fn run(mut self, token: CancellationToken) {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Watch session stopped");
            }
            result = self.sync() => match result {
                Err(Error::Closed(reason)) => debug!("Watch session ended: {}", reason),
                Err(e) => {
                    error!("Watch session failed: {}", e);
                    let _ = self.tx.send(SessionEvent::Change(ChangeEvent::Error(e)));
                }
                Ok(()) => {}
            },
        }
        self.set_state(SessionState::Closed);
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Watch session {:?} -> {:?}", previous, state);
        }
    }

    async fn sync(&mut self) -> Result<()> {
        self.set_state(SessionState::Listing);
        self.relist().await?;
        loop {
            self.set_state(SessionState::Watching);
            self.watch().await?;
            self.set_state(SessionState::Resyncing);
            self.relist().await?;
        }
    }

    fn emit(&self, event: SessionEvent<K>) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::Closed("event stream dropped".to_string()))
    }

    /// Sleep before retrying `err`, or return it when it is fatal or the retry
    /// budget is exhausted.
    async fn retry_or_fail(&mut self, err: Error) -> Result<()> {
        if !err.is_retryable() {
            return Err(err);
        }
        match self.backoff.next_delay() {
            Some(delay) => {
                warn!(
                    "{}, retrying in {:?} (attempt {})",
                    err,
                    delay,
                    self.backoff.attempts()
                );
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => {
                warn!("Giving up after {} attempts", self.backoff.attempts());
                Err(err)
            }
        }
    }

    async fn relist(&mut self) -> Result<()> {
        let listing = loop {
            match self.control_plane.list(&self.filter).await {
                Ok(listing) => {
                    self.backoff.reset();
                    break listing;
                }
                Err(e) => self.retry_or_fail(e).await?,
            }
        };
        self.reconcile(listing)
    }

    /// Emit the events that turn the last known state into `listing`.
    fn reconcile(&mut self, listing: Listing<K>) -> Result<()> {
        let fresh: HashMap<_, _> = listing
            .items
            .into_iter()
            .map(|obj| {
                let snapshot = ResourceSnapshot::new(obj);
                (snapshot.key().clone(), snapshot)
            })
            .collect();
        let previous = std::mem::take(&mut self.known);

        let (mut added, mut modified, mut deleted) = (0, 0, 0);
        for (key, snapshot) in &fresh {
            match previous.get(key) {
                None => {
                    added += 1;
                    self.emit(SessionEvent::Change(ChangeEvent::Added(snapshot.clone())))?;
                }
                Some(old) if old.differs_from(snapshot) => {
                    modified += 1;
                    self.emit(SessionEvent::Change(ChangeEvent::Modified(snapshot.clone())))?;
                }
                Some(_) => {}
            }
        }
        for (key, old) in previous {
            if !fresh.contains_key(&key) {
                deleted += 1;
                self.emit(SessionEvent::Change(ChangeEvent::Deleted(old)))?;
            }
        }

        info!(
            "Synced {} items at resource version {} ({} added, {} modified, {} deleted)",
            fresh.len(),
            listing.resource_version,
            added,
            modified,
            deleted
        );
        self.known = fresh;
        self.cursor = listing.resource_version;
        self.emit(SessionEvent::Synced)
    }

    /// Watch from the cursor until the stream ends. `Ok` means a relist is due.
    async fn watch(&mut self) -> Result<()> {
        let mut stream = match self.control_plane.watch(&self.filter, &self.cursor).await {
            Ok(stream) => stream,
            Err(Error::StaleResourceVersion(msg)) => {
                info!("Resource version {} expired ({}), resyncing", self.cursor, msg);
                return Ok(());
            }
            Err(e) => return self.retry_or_fail(e).await,
        };

        let mut received = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    received = true;
                    self.backoff.reset();
                    self.forward(event)?;
                }
                Err(Error::StaleResourceVersion(msg)) => {
                    info!("Resource version {} expired ({}), resyncing", self.cursor, msg);
                    return Ok(());
                }
                Err(e) => return self.retry_or_fail(e).await,
            }
        }

        if received {
            debug!("Watch stream closed at resource version {}", self.cursor);
            Ok(())
        } else {
            self.retry_or_fail(Error::Transport(
                "watch stream closed without delivering events".to_string(),
            ))
            .await
        }
    }

    fn forward(&mut self, event: RawEvent<K>) -> Result<()> {
        let change = match event {
            RawEvent::Bookmark(version) => {
                self.cursor = version;
                return Ok(());
            }
            RawEvent::Added(obj) => ChangeEvent::Added(ResourceSnapshot::new(obj)),
            RawEvent::Modified(obj) => ChangeEvent::Modified(ResourceSnapshot::new(obj)),
            RawEvent::Deleted(obj) => ChangeEvent::Deleted(ResourceSnapshot::new(obj)),
        };

        if let Some(snapshot) = change.snapshot() {
            if let Some(version) = snapshot.resource_version() {
                self.cursor = version.as_str().to_string();
            }
            debug!("{:?} {}", change.kind(), snapshot.key());
            if matches!(change, ChangeEvent::Deleted(_)) {
                self.known.remove(snapshot.key());
            } else {
                self.known.insert(snapshot.key().clone(), snapshot.clone());
            }
        }
        self.emit(SessionEvent::Change(change))
    }
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Registry of event consumers attached to an informer.

use crate::types::{ChangeEvent, ResourceSnapshot};
use futures::Stream;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Selects the snapshots a consumer is interested in. Error events bypass it.
pub type SnapshotFilter<K> = Arc<dyn Fn(&ResourceSnapshot<K>) -> bool + Send + Sync>;

pub type Callback<K> = Arc<dyn Fn(&ChangeEvent<K>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

enum Sink<K> {
    Callback(Callback<K>),
    Channel(mpsc::UnboundedSender<ChangeEvent<K>>),
}

struct Registration<K> {
    id: HandlerId,
    filter: Option<SnapshotFilter<K>>,
    sink: Sink<K>,
}

impl<K> Registration<K> {
    fn accepts(&self, event: &ChangeEvent<K>) -> bool {
        match (&self.filter, event.snapshot()) {
            (Some(filter), Some(snapshot)) => filter(snapshot),
            _ => true,
        }
    }
}

struct Entries<K> {
    registrations: Vec<Arc<Registration<K>>>,
    closed: bool,
}

pub(crate) struct Handlers<K> {
    next_id: AtomicU64,
    entries: Mutex<Entries<K>>,
}

impl<K> Handlers<K> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Entries {
                registrations: Vec::new(),
                closed: false,
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries<K>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, filter: Option<SnapshotFilter<K>>, sink: Sink<K>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries();
        if entries.closed {
            debug!("Informer closed, dropping handler {:?}", id);
        } else {
            entries
                .registrations
                .push(Arc::new(Registration { id, filter, sink }));
        }
        id
    }

    pub(crate) fn add_callback(
        &self,
        filter: Option<SnapshotFilter<K>>,
        callback: Callback<K>,
    ) -> HandlerId {
        self.register(filter, Sink::Callback(callback))
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        filter: Option<SnapshotFilter<K>>,
    ) -> Subscription<K> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register(filter, Sink::Channel(tx));
        Subscription {
            id,
            rx,
            handlers: Arc::downgrade(self),
        }
    }

    pub(crate) fn remove(&self, id: HandlerId) {
        self.entries().registrations.retain(|r| r.id != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().registrations.len()
    }

    /// Deliver `event` to every interested consumer, in registration order.
    ///
    /// Consumers are invoked outside the lock, so callbacks may register or
    /// remove handlers.
    pub(crate) fn dispatch(&self, event: &ChangeEvent<K>) {
        let registrations: Vec<_> = self.entries().registrations.clone();
        let mut gone = Vec::new();

        for registration in registrations.iter().filter(|r| r.accepts(event)) {
            match &registration.sink {
                Sink::Callback(callback) => callback(event),
                Sink::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        gone.push(registration.id);
                    }
                }
            }
        }

        if !gone.is_empty() {
            self.entries()
                .registrations
                .retain(|r| !gone.contains(&r.id));
        }
    }

    /// Drop every consumer; subscriptions end and later ones end immediately.
    pub(crate) fn close(&self) {
        let mut entries = self.entries();
        entries.closed = true;
        entries.registrations.clear();
    }
}

/// Channel-backed consumer of an informer's events.
///
/// Ends when the informer stops. Dropping it unregisters it.
pub struct Subscription<K> {
    id: HandlerId,
    rx: mpsc::UnboundedReceiver<ChangeEvent<K>>,
    handlers: Weak<Handlers<K>>,
}

impl<K> Subscription<K> {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent<K>> {
        self.rx.recv().await
    }
}

impl<K> Stream for Subscription<K> {
    type Item = ChangeEvent<K>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<K> Drop for Subscription<K> {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers.remove(self.id);
        }
    }
}

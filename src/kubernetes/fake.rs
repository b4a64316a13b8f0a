// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-memory control plane for tests and local experiments.
//!
//! Every mutation bumps a global resource version and is recorded in a history
//! so that a watch opened from an older version replays what it missed, like
//! the API server's watch cache. Faults (dropped connections, expired versions,
//! failing calls, silently lost events) can be injected on demand.

use crate::error::{Error, Result};
use crate::kubernetes::control_plane::{ControlPlane, Listing, RawEvent, WatchStream};
use crate::types::{ListFilter, WatchedResource};
use async_trait::async_trait;
use futures::StreamExt;
use kube::ResourceExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

type Sender<K> = mpsc::UnboundedSender<Result<RawEvent<K>>>;

struct Watcher<K> {
    filter: ListFilter,
    tx: Sender<K>,
}

struct State<K> {
    objects: BTreeMap<(String, String), K>,
    version: u64,
    history: Vec<(u64, RawEvent<K>)>,
    compacted: u64,
    watchers: Vec<Watcher<K>>,
    list_failures: VecDeque<Error>,
    watch_failures: VecDeque<Error>,
    list_calls: usize,
    watch_calls: usize,
}

pub struct FakeControlPlane<K> {
    state: Mutex<State<K>>,
}

impl<K: WatchedResource> Default for FakeControlPlane<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn object_key<K: WatchedResource>(obj: &K) -> (String, String) {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

fn event_object<K>(event: &RawEvent<K>) -> Option<&K> {
    match event {
        RawEvent::Added(o) | RawEvent::Modified(o) | RawEvent::Deleted(o) => Some(o),
        RawEvent::Bookmark(_) => None,
    }
}

impl<K: WatchedResource> FakeControlPlane<K> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                version: 0,
                history: Vec::new(),
                compacted: 0,
                watchers: Vec::new(),
                list_failures: VecDeque::new(),
                watch_failures: VecDeque::new(),
                list_calls: 0,
                watch_calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `obj` under a fresh resource version and return the stored copy.
    fn stamp(state: &mut State<K>, mut obj: K) -> K {
        state.version += 1;
        obj.meta_mut().resource_version = Some(state.version.to_string());
        obj
    }

    fn publish(state: &mut State<K>, event: RawEvent<K>) {
        if let Some(obj) = event_object(&event) {
            state
                .watchers
                .retain(|w| !w.filter.matches(obj) || w.tx.send(Ok(event.clone())).is_ok());
        }
        state.history.push((state.version, event));
    }

    /// Create or replace an object, emitting Added or Modified.
    pub fn upsert(&self, obj: K) -> K {
        let mut state = self.state();
        let key = object_key(&obj);
        let stored = Self::stamp(&mut state, obj);
        let existed = state.objects.insert(key, stored.clone()).is_some();
        let event = if existed {
            RawEvent::Modified(stored.clone())
        } else {
            RawEvent::Added(stored.clone())
        };
        Self::publish(&mut state, event);
        stored
    }

    /// Delete an object, emitting Deleted.
    pub fn remove(&self, namespace: &str, name: &str) -> Option<K> {
        let mut state = self.state();
        let obj = state
            .objects
            .remove(&(namespace.to_string(), name.to_string()))?;
        let stored = Self::stamp(&mut state, obj);
        Self::publish(&mut state, RawEvent::Deleted(stored.clone()));
        Some(stored)
    }

    /// Delete an object without any watcher or history ever seeing the event,
    /// as if it was lost while clients were disconnected.
    pub fn remove_unobserved(&self, namespace: &str, name: &str) -> Option<K> {
        let mut state = self.state();
        let obj = state
            .objects
            .remove(&(namespace.to_string(), name.to_string()))?;
        state.version += 1;
        state.compacted = state.version;
        Some(obj)
    }

    pub fn current(&self, namespace: &str, name: &str) -> Option<K> {
        self.state()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Drop every open watch connection; streams end without an error.
    pub fn disconnect_watches(&self) {
        self.state().watchers.clear();
    }

    /// Tell every open watch its version expired, then drop it.
    pub fn expire_watches(&self) {
        let mut state = self.state();
        let version = state.version;
        for watcher in state.watchers.drain(..) {
            let _ = watcher.tx.send(Err(Error::StaleResourceVersion(format!(
                "too old resource version (current {})",
                version
            ))));
        }
    }

    /// Forget history: watches from any version older than now are rejected.
    pub fn compact(&self) {
        let mut state = self.state();
        state.compacted = state.version;
        state.history.clear();
    }

    pub fn fail_next_list(&self, error: Error) {
        self.state().list_failures.push_back(error);
    }

    pub fn fail_next_watch(&self, error: Error) {
        self.state().watch_failures.push_back(error);
    }

    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    pub fn watch_calls(&self) -> usize {
        self.state().watch_calls
    }

    /// Watch connections whose consumer is still alive.
    pub fn active_watches(&self) -> usize {
        let mut state = self.state();
        state.watchers.retain(|w| !w.tx.is_closed());
        state.watchers.len()
    }
}

#[async_trait]
impl<K: WatchedResource> ControlPlane<K> for FakeControlPlane<K> {
    async fn list(&self, filter: &ListFilter) -> Result<Listing<K>> {
        let mut state = self.state();
        state.list_calls += 1;
        if let Some(err) = state.list_failures.pop_front() {
            return Err(err);
        }

        let items = state
            .objects
            .values()
            .filter(|o| filter.matches(*o))
            .cloned()
            .collect();
        Ok(Listing {
            items,
            resource_version: state.version.to_string(),
        })
    }

    async fn watch(&self, filter: &ListFilter, resource_version: &str) -> Result<WatchStream<K>> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state();
            state.watch_calls += 1;
            if let Some(err) = state.watch_failures.pop_front() {
                return Err(err);
            }

            let from: u64 = resource_version.parse().map_err(|_| Error::Api {
                code: 400,
                message: format!("invalid resource version {:?}", resource_version),
            })?;

            if from < state.compacted {
                debug!("Rejecting watch from compacted version {}", from);
                let _ = tx.send(Err(Error::StaleResourceVersion(format!(
                    "too old resource version: {} ({})",
                    from, state.compacted
                ))));
            } else {
                for (_, event) in state.history.iter().filter(|(v, _)| *v > from) {
                    if event_object(event).is_some_and(|o| filter.matches(o)) {
                        let _ = tx.send(Ok(event.clone()));
                    }
                }
                state.watchers.push(Watcher {
                    filter: filter.clone(),
                    tx,
                });
            }
        }

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.current(namespace, name))
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K> {
        let mut obj = obj.clone();
        obj.meta_mut().namespace = Some(namespace.to_string());
        if self.current(namespace, &obj.name_any()).is_some() {
            return Err(Error::Api {
                code: 409,
                message: format!("{}/{} already exists", namespace, obj.name_any()),
            });
        }
        Ok(self.upsert(obj))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.remove(namespace, name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("{}/{} not found", namespace, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Pod;
    use kube::api::ObjectMeta;

    fn make_pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("test".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_list_reports_current_version() {
        let fake = FakeControlPlane::new();
        fake.upsert(make_pod("a"));
        fake.upsert(make_pod("b"));

        let listing = fake.list(&ListFilter::namespaced("test")).await.unwrap();

        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.resource_version, "2");
    }

    #[tokio::test]
    async fn test_watch_replays_history_after_version() {
        let fake = FakeControlPlane::new();
        fake.upsert(make_pod("a"));
        fake.upsert(make_pod("b"));

        let mut stream = fake.watch(&ListFilter::all(), "1").await.unwrap();
        let event = stream.next().await.unwrap().unwrap();

        match event {
            RawEvent::Added(pod) => assert_eq!(pod.name_any(), "b"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_watch_receives_live_events() {
        let fake = FakeControlPlane::new();
        let mut stream = fake.watch(&ListFilter::all(), "0").await.unwrap();

        fake.upsert(make_pod("a"));
        fake.upsert(make_pod("a"));
        fake.remove("test", "a");

        assert!(matches!(stream.next().await, Some(Ok(RawEvent::Added(_)))));
        assert!(matches!(stream.next().await, Some(Ok(RawEvent::Modified(_)))));
        assert!(matches!(stream.next().await, Some(Ok(RawEvent::Deleted(_)))));
    }

    #[tokio::test]
    async fn test_compacted_watch_is_stale() {
        let fake = FakeControlPlane::new();
        fake.upsert(make_pod("a"));
        fake.compact();
        fake.upsert(make_pod("b"));

        let mut stream = fake.watch(&ListFilter::all(), "0").await.unwrap();

        assert!(matches!(
            stream.next().await,
            Some(Err(Error::StaleResourceVersion(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_ends_streams() {
        let fake = FakeControlPlane::<Pod>::new();
        let mut stream = fake.watch(&ListFilter::all(), "0").await.unwrap();
        assert_eq!(fake.active_watches(), 1);

        fake.disconnect_watches();

        assert!(stream.next().await.is_none());
        assert_eq!(fake.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_dropped_stream_is_not_active() {
        let fake = FakeControlPlane::<Pod>::new();
        let stream = fake.watch(&ListFilter::all(), "0").await.unwrap();
        drop(stream);

        assert_eq!(fake.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_injected_list_failure() {
        let fake = FakeControlPlane::<Pod>::new();
        fake.fail_next_list(Error::Unauthorized("bad token".to_string()));

        let err = fake.list(&ListFilter::all()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert!(fake.list(&ListFilter::all()).await.is_ok());
        assert_eq!(fake.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_create_conflict_and_delete_missing() {
        let fake = FakeControlPlane::new();
        fake.create("test", &make_pod("a")).await.unwrap();

        assert!(matches!(
            fake.create("test", &make_pod("a")).await,
            Err(Error::Api { code: 409, .. })
        ));
        assert!(fake.delete("test", "a").await.is_ok());
        assert!(matches!(
            fake.delete("test", "a").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_filtered_watch_skips_other_names() {
        let fake = FakeControlPlane::new();
        let mut stream = fake
            .watch(&ListFilter::for_name("test", "b"), "0")
            .await
            .unwrap();

        fake.upsert(make_pod("a"));
        fake.upsert(make_pod("b"));

        match stream.next().await {
            Some(Ok(RawEvent::Added(pod))) => assert_eq!(pod.name_any(), "b"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}

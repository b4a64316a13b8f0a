// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Block until a resource satisfies a predicate, a deadline passes or the
//! caller cancels.

use crate::config::WatchConfig;
use crate::error::{Error, WaitError};
use crate::informer::Informer;
use crate::kubernetes::ControlPlane;
use crate::types::{
    ChangeEvent, ListFilter, ResourceKey, ResourceSnapshot, SessionEvent, WatchedResource,
};
use crate::watch::WatchSession;
use futures::{future, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

type WaitResult<K> = std::result::Result<ResourceSnapshot<K>, WaitError<K>>;

enum Source<K> {
    /// Shared cache and event fan-out of a running informer.
    Informer(Arc<Informer<K>>),
    /// A private watch session per wait call.
    Direct {
        control_plane: Arc<dyn ControlPlane<K>>,
        config: WatchConfig,
    },
}

/// Waits for conditions on resources of one type.
///
/// Each call owns a private subscription (an informer subscription or a
/// dedicated watch session) that is released on every exit path. The waiter
/// never retries: the first terminal outcome is returned.
pub struct ConditionWaiter<K> {
    source: Source<K>,
}

impl<K: WatchedResource> ConditionWaiter<K> {
    pub fn from_informer(informer: Arc<Informer<K>>) -> Self {
        Self {
            source: Source::Informer(informer),
        }
    }

    pub fn direct(control_plane: Arc<dyn ControlPlane<K>>, config: WatchConfig) -> Self {
        Self {
            source: Source::Direct {
                control_plane,
                config,
            },
        }
    }

    pub async fn wait<P>(
        &self,
        key: &ResourceKey,
        predicate: P,
        timeout: Duration,
    ) -> WaitResult<K>
    where
        P: Fn(&K) -> bool,
    {
        self.wait_with_cancel(key, predicate, timeout, &CancellationToken::new())
            .await
    }

    /// Wait for `predicate` to hold on the resource identified by `key`.
    ///
    /// Returns immediately when it already holds on the current state.
    /// A deleted resource resets the last observed snapshot and the wait goes
    /// on, since it may be recreated.
    #[instrument(skip(self, predicate, cancel), fields(key = %key))]
    pub async fn wait_with_cancel<P>(
        &self,
        key: &ResourceKey,
        predicate: P,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitResult<K>
    where
        P: Fn(&K) -> bool,
    {
        let deadline = deadline_after(timeout);
        let same_key = |k: &ResourceKey| k == key;

        match &self.source {
            Source::Informer(informer) => {
                // Subscribe before reading the store so nothing slips in between.
                let wanted = key.clone();
                let subscription =
                    informer.subscribe(Some(move |s: &ResourceSnapshot<K>| s.key() == &wanted));
                let current = informer.store().get(key);
                if let Some(snapshot) = current.as_ref().filter(|s| predicate(s.object())) {
                    debug!("Condition already satisfied");
                    return Ok(snapshot.clone());
                }
                watch_until(
                    subscription,
                    key,
                    same_key,
                    current,
                    &predicate,
                    deadline,
                    cancel,
                )
                .await
            }
            Source::Direct {
                control_plane,
                config,
            } => {
                let Some(namespace) = key.namespace() else {
                    return Err(WaitError::WatchFailed {
                        key: key.clone(),
                        source: Error::NotFound(format!("{} has no namespace", key)),
                    });
                };
                let current = control_plane
                    .get(namespace, key.name())
                    .await
                    .map_err(|source| WaitError::WatchFailed {
                        key: key.clone(),
                        source,
                    })?
                    .map(ResourceSnapshot::new);
                if let Some(snapshot) = current.as_ref().filter(|s| predicate(s.object())) {
                    debug!("Condition already satisfied");
                    return Ok(snapshot.clone());
                }

                let filter = ListFilter::for_name(namespace, key.name());
                let events = session_changes(control_plane, filter, config);
                watch_until(events, key, same_key, current, &predicate, deadline, cancel).await
            }
        }
    }

    /// Wait until any resource matching `filter` satisfies `predicate`.
    ///
    /// Selectors that cannot be evaluated fail at once with
    /// [`WaitError::WatchFailed`] instead of never matching.
    pub async fn wait_for_selector<P>(
        &self,
        filter: &ListFilter,
        predicate: P,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitResult<K>
    where
        P: Fn(&K) -> bool,
    {
        let deadline = deadline_after(timeout);
        let key = selector_key::<K>(filter);
        if let Err(source) = filter.validate() {
            return Err(WaitError::WatchFailed { key, source });
        }
        info!("Waiting for a resource matching {}", key);

        match &self.source {
            Source::Informer(informer) => {
                let selector = filter.clone();
                let subscription = informer
                    .subscribe(Some(move |s: &ResourceSnapshot<K>| selector.matches(s.object())));
                let current = informer.store().list(|s| filter.matches(s.object()));
                if let Some(snapshot) = current.iter().find(|s| predicate(s.object())) {
                    return Ok(snapshot.clone());
                }
                watch_until(subscription, &key, |_| true, None, &predicate, deadline, cancel).await
            }
            Source::Direct {
                control_plane,
                config,
            } => {
                // The session's baseline covers the current state.
                let events = session_changes(control_plane, filter.clone(), config);
                watch_until(events, &key, |_| true, None, &predicate, deadline, cancel).await
            }
        }
    }
}

/// Stand-in deadline for timeouts that do not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Diagnostic key standing for "whatever matches this filter".
fn selector_key<K: WatchedResource>(filter: &ListFilter) -> ResourceKey {
    let selector = [filter.label_selector.as_deref(), filter.field_selector.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(",");
    ResourceKey::new(
        K::kind(&()),
        filter.namespace.as_deref(),
        format!("[{}]", selector),
    )
}

/// Change events of a dedicated session, which stops when the stream is dropped.
fn session_changes<K: WatchedResource>(
    control_plane: &Arc<dyn ControlPlane<K>>,
    filter: ListFilter,
    config: &WatchConfig,
) -> impl Stream<Item = ChangeEvent<K>> + Unpin {
    let session = WatchSession::new(control_plane.clone(), filter, config.clone());
    let (_handle, stream) = session.start();
    stream.filter_map(|event| {
        future::ready(match event {
            SessionEvent::Change(change) => Some(change),
            SessionEvent::Synced => None,
        })
    })
}

async fn watch_until<K, S, M, P>(
    mut events: S,
    key: &ResourceKey,
    matches: M,
    mut last: Option<ResourceSnapshot<K>>,
    predicate: &P,
    deadline: Instant,
    cancel: &CancellationToken,
) -> WaitResult<K>
where
    K: WatchedResource,
    S: Stream<Item = ChangeEvent<K>> + Unpin,
    M: Fn(&ResourceKey) -> bool,
    P: Fn(&K) -> bool,
{
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            event = events.next() => match event {
                Some(ChangeEvent::Added(snapshot)) | Some(ChangeEvent::Modified(snapshot)) => {
                    if !matches(snapshot.key()) {
                        continue;
                    }
                    if predicate(snapshot.object()) {
                        info!("Condition met for {}", snapshot.key());
                        return Ok(snapshot);
                    }
                    last = Some(snapshot);
                }
                Some(ChangeEvent::Deleted(snapshot)) => {
                    if matches(snapshot.key()) {
                        debug!("{} deleted while waiting", snapshot.key());
                        last = None;
                    }
                }
                Some(ChangeEvent::Error(source)) => {
                    return Err(WaitError::WatchFailed {
                        key: key.clone(),
                        source,
                    });
                }
                None => {
                    return Err(WaitError::WatchFailed {
                        key: key.clone(),
                        source: Error::Closed("event stream ended".to_string()),
                    });
                }
            },
            _ = cancel.cancelled() => {
                debug!("Wait cancelled");
                return Err(WaitError::Cancelled { key: key.clone() });
            }
            _ = &mut sleep => {
                info!("Timed out waiting for condition");
                return Err(WaitError::ConditionTimeout { key: key.clone(), last });
            }
        }
    }
}

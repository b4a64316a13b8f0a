// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control plane backed by a live API server through `kube::Api`.

use crate::error::{Error, Result};
use crate::kubernetes::control_plane::{ControlPlane, Listing, RawEvent, WatchStream};
use crate::types::ListFilter;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, PostParams, WatchEvent};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::{debug, instrument};

/// [`ControlPlane`] for a namespaced resource type, talking to the API server.
pub struct KubeControlPlane<K> {
    client: Client,
    _resource: PhantomData<fn() -> K>,
}

impl<K> Clone for KubeControlPlane<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _resource: PhantomData,
        }
    }
}

impl<K> KubeControlPlane<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _resource: PhantomData,
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<K> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

fn convert<K>(event: kube::Result<WatchEvent<K>>) -> Result<RawEvent<K>> {
    match event {
        Ok(WatchEvent::Added(obj)) => Ok(RawEvent::Added(obj)),
        Ok(WatchEvent::Modified(obj)) => Ok(RawEvent::Modified(obj)),
        Ok(WatchEvent::Deleted(obj)) => Ok(RawEvent::Deleted(obj)),
        Ok(WatchEvent::Bookmark(bookmark)) => {
            Ok(RawEvent::Bookmark(bookmark.metadata.resource_version))
        }
        Ok(WatchEvent::Error(resp)) => Err(Error::from_status(resp.code, resp.message)),
        Err(e) => Err(Error::from(e)),
    }
}

#[async_trait]
impl<K> ControlPlane<K> for KubeControlPlane<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn list(&self, filter: &ListFilter) -> Result<Listing<K>> {
        let list = self
            .api(filter.namespace.as_deref())
            .list(&filter.list_params())
            .await?;

        let resource_version = list.metadata.resource_version.unwrap_or_default();
        debug!(
            "Listed {} items at resource version {}",
            list.items.len(),
            resource_version
        );

        Ok(Listing {
            items: list.items,
            resource_version,
        })
    }

    #[instrument(skip(self), fields(kind = %K::kind(&())))]
    async fn watch(&self, filter: &ListFilter, resource_version: &str) -> Result<WatchStream<K>> {
        let stream = self
            .api(filter.namespace.as_deref())
            .watch(&filter.watch_params(), resource_version)
            .await?;

        Ok(stream.map(convert).boxed())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api(Some(namespace)).get_opt(name).await?)
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K> {
        Ok(self
            .api(Some(namespace))
            .create(&PostParams::default(), obj)
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api(Some(namespace))
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{job_json, job_list_json, status_json, watch_line, MockService};
    use futures::TryStreamExt;
    use k8s_openapi::api::batch::v1::Job;

    const JOBS_PATH: &str = "/apis/batch/v1/namespaces/test/jobs";

    fn control_plane(mock: MockService) -> KubeControlPlane<Job> {
        KubeControlPlane::new(mock.into_client())
    }

    #[tokio::test]
    async fn test_list_returns_items_and_version() {
        let mock = MockService::new().on_get(
            JOBS_PATH,
            200,
            &job_list_json("42", &[job_json("test", "build", "40", 0)]),
        );

        let listing = control_plane(mock)
            .list(&ListFilter::namespaced("test"))
            .await
            .unwrap();

        assert_eq!(listing.resource_version, "42");
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.items[0].metadata.name.as_deref(), Some("build"));
    }

    #[tokio::test]
    async fn test_list_unauthorized_is_classified() {
        let mock = MockService::new().on_get(JOBS_PATH, 401, &status_json(401, "Unauthorized"));

        let err = control_plane(mock)
            .list(&ListFilter::namespaced("test"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let mock = MockService::new();

        let job = control_plane(mock).get("test", "missing").await.unwrap();

        assert!(job.is_none());
    }

    #[tokio::test]
    async fn test_get_existing() {
        let mock = MockService::new().on_get(
            &format!("{}/build", JOBS_PATH),
            200,
            &job_json("test", "build", "7", 1),
        );

        let job = control_plane(mock).get("test", "build").await.unwrap().unwrap();

        assert_eq!(job.status.unwrap().succeeded, Some(1));
    }

    #[tokio::test]
    async fn test_create_returns_server_copy() {
        let mock = MockService::new().on_post(JOBS_PATH, 201, &job_json("test", "build", "50", 0));
        let job: Job = serde_json::from_str(&job_json("test", "build", "", 0)).unwrap();

        let created = control_plane(mock).create("test", &job).await.unwrap();

        assert_eq!(created.metadata.resource_version.as_deref(), Some("50"));
    }

    #[tokio::test]
    async fn test_watch_converts_events() {
        let body = [
            watch_line("ADDED", &job_json("test", "build", "43", 0)),
            watch_line(
                "BOOKMARK",
                r#"{"kind":"Job","apiVersion":"batch/v1","metadata":{"resourceVersion":"44"}}"#,
            ),
            watch_line("MODIFIED", &job_json("test", "build", "45", 1)),
            watch_line("DELETED", &job_json("test", "build", "46", 1)),
        ]
        .concat();
        let mock = MockService::new().on_watch(JOBS_PATH, &body);

        let events: Vec<_> = control_plane(mock)
            .watch(&ListFilter::namespaced("test"), "42")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], RawEvent::Added(_)));
        assert_eq!(events[1], RawEvent::Bookmark("44".to_string()));
        assert!(matches!(events[2], RawEvent::Modified(_)));
        assert!(matches!(events[3], RawEvent::Deleted(_)));
    }

    #[tokio::test]
    async fn test_watch_gone_becomes_stale_version() {
        let body = watch_line("ERROR", &status_json(410, "too old resource version: 1 (42)"));
        let mock = MockService::new().on_watch(JOBS_PATH, &body);

        let mut stream = control_plane(mock)
            .watch(&ListFilter::namespaced("test"), "1")
            .await
            .unwrap();

        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(Error::StaleResourceVersion(_))));
    }
}

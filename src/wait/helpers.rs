// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::error::WaitError;
use crate::types::{ResourceKey, ResourceSnapshot};
use crate::wait::conditions::{
    is_job_finished, is_job_succeeded, is_pod_ready, is_statefulset_ready,
};
use crate::wait::ConditionWaiter;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use std::time::Duration;
use tracing::info;

pub async fn wait_for_job_to_succeed(
    waiter: &ConditionWaiter<Job>,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<ResourceSnapshot<Job>, WaitError<Job>> {
    info!("Waiting up to {:?} for job {}/{} to succeed", timeout, namespace, name);
    waiter
        .wait(&ResourceKey::of::<Job>(namespace, name), is_job_succeeded, timeout)
        .await
}

/// Wait for the job to finish, whether it succeeded or failed.
pub async fn wait_for_job_to_complete(
    waiter: &ConditionWaiter<Job>,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<ResourceSnapshot<Job>, WaitError<Job>> {
    info!("Waiting up to {:?} for job {}/{} to complete", timeout, namespace, name);
    waiter
        .wait(&ResourceKey::of::<Job>(namespace, name), is_job_finished, timeout)
        .await
}

pub async fn wait_for_pod_ready(
    waiter: &ConditionWaiter<Pod>,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<ResourceSnapshot<Pod>, WaitError<Pod>> {
    info!("Waiting up to {:?} for pod {}/{} to be ready", timeout, namespace, name);
    waiter
        .wait(&ResourceKey::of::<Pod>(namespace, name), is_pod_ready, timeout)
        .await
}

pub async fn wait_for_statefulset_ready(
    waiter: &ConditionWaiter<StatefulSet>,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<ResourceSnapshot<StatefulSet>, WaitError<StatefulSet>> {
    info!(
        "Waiting up to {:?} for statefulset {}/{} to be ready",
        timeout, namespace, name
    );
    waiter
        .wait(
            &ResourceKey::of::<StatefulSet>(namespace, name),
            is_statefulset_ready,
            timeout,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchConfig;
    use crate::kubernetes::FakeControlPlane;
    use k8s_openapi::api::batch::v1::{JobSpec, JobStatus};
    use kube::api::ObjectMeta;
    use std::sync::Arc;

    fn make_job(name: &str, status: JobStatus) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("batch".to_string()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(2),
                ..Default::default()
            }),
            status: Some(status),
        }
    }

    #[tokio::test]
    async fn test_job_to_succeed() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.upsert(make_job(
            "migrate",
            JobStatus {
                succeeded: Some(1),
                ..Default::default()
            },
        ));
        let waiter = ConditionWaiter::direct(fake, WatchConfig::default());

        let job = wait_for_job_to_succeed(&waiter, "batch", "migrate", Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(job.key().name(), "migrate");
    }

    #[tokio::test]
    async fn test_failed_job_completes_but_does_not_succeed() {
        let fake = Arc::new(FakeControlPlane::new());
        fake.upsert(make_job(
            "flaky",
            JobStatus {
                failed: Some(2),
                active: Some(0),
                ..Default::default()
            },
        ));
        let waiter = ConditionWaiter::direct(fake, WatchConfig::default());

        assert!(
            wait_for_job_to_complete(&waiter, "batch", "flaky", Duration::from_secs(1))
                .await
                .is_ok()
        );
        let err = wait_for_job_to_succeed(&waiter, "batch", "flaky", Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Predicates over common workload resources. Missing fields never satisfy a
//! predicate.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;

/// At least one pod of the Job succeeded.
pub fn is_job_succeeded(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.succeeded)
        .is_some_and(|n| n >= 1)
}

/// The Job completed, or ran out of retries with nothing left running.
pub fn is_job_finished(job: &Job) -> bool {
    let Some(status) = job.status.as_ref() else {
        return false;
    };
    if status.completion_time.is_some() {
        return true;
    }

    let backoff_limit = job.spec.as_ref().and_then(|s| s.backoff_limit);
    let active = status.active.unwrap_or(0);
    let failed = status.failed.unwrap_or(0);
    active == 0 && backoff_limit.is_some_and(|limit| failed >= limit)
}

pub fn is_job_finished_successfully(job: &Job) -> bool {
    is_job_finished(job) && is_job_succeeded(job)
}

/// Running, not terminating and reporting `Ready=True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    status.phase.as_deref() == Some("Running")
        && status
            .conditions
            .iter()
            .flatten()
            .any(|c| c.type_ == "Ready" && c.status == "True")
}

pub fn is_pod_completed(pod: &Pod) -> bool {
    matches!(
        pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        Some("Succeeded") | Some("Failed")
    )
}

/// All desired replicas are ready and the controller has seen the latest spec.
pub fn is_statefulset_ready(sts: &StatefulSet) -> bool {
    let Some(status) = sts.status.as_ref() else {
        return false;
    };
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = status.ready_replicas.unwrap_or(0);
    let observed = match (status.observed_generation, sts.metadata.generation) {
        (Some(observed), Some(generation)) => observed >= generation,
        (None, Some(_)) => false,
        (_, None) => true,
    };
    ready >= desired && observed
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{StatefulSetSpec, StatefulSetStatus};
    use k8s_openapi::api::batch::v1::{JobSpec, JobStatus};
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;

    fn now() -> Time {
        Time(k8s_openapi::chrono::Utc::now())
    }

    fn make_job(backoff_limit: Option<i32>, status: JobStatus) -> Job {
        Job {
            spec: Some(JobSpec {
                backoff_limit,
                ..Default::default()
            }),
            status: Some(status),
            ..Default::default()
        }
    }

    fn make_pod(phase: &str, ready: &str) -> Pod {
        Pod {
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn make_statefulset(
        replicas: Option<i32>,
        ready: Option<i32>,
        generation: i64,
        observed: i64,
    ) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas,
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                ready_replicas: ready,
                observed_generation: Some(observed),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_job_succeeded() {
        let job = make_job(
            None,
            JobStatus {
                succeeded: Some(1),
                ..Default::default()
            },
        );
        assert!(is_job_succeeded(&job));
        assert!(!is_job_succeeded(&Job::default()));
        assert!(!is_job_succeeded(&make_job(None, JobStatus::default())));
    }

    #[test]
    fn test_job_finished_on_completion_time() {
        let job = make_job(
            None,
            JobStatus {
                completion_time: Some(now()),
                succeeded: Some(1),
                ..Default::default()
            },
        );
        assert!(is_job_finished(&job));
        assert!(is_job_finished_successfully(&job));
    }

    #[test]
    fn test_job_finished_after_exhausting_backoff() {
        let job = make_job(
            Some(3),
            JobStatus {
                failed: Some(3),
                active: Some(0),
                ..Default::default()
            },
        );
        assert!(is_job_finished(&job));
        assert!(!is_job_finished_successfully(&job));
    }

    #[test]
    fn test_job_not_finished_while_active_or_without_limit() {
        let active = make_job(
            Some(3),
            JobStatus {
                failed: Some(3),
                active: Some(1),
                ..Default::default()
            },
        );
        let unlimited = make_job(
            None,
            JobStatus {
                failed: Some(10),
                ..Default::default()
            },
        );
        assert!(!is_job_finished(&active));
        assert!(!is_job_finished(&unlimited));
        assert!(!is_job_finished(&Job::default()));
    }

    #[test]
    fn test_pod_ready() {
        assert!(is_pod_ready(&make_pod("Running", "True")));
        assert!(!is_pod_ready(&make_pod("Running", "False")));
        assert!(!is_pod_ready(&make_pod("Pending", "True")));
        assert!(!is_pod_ready(&Pod::default()));
    }

    #[test]
    fn test_terminating_pod_is_not_ready() {
        let mut pod = make_pod("Running", "True");
        pod.metadata.deletion_timestamp = Some(now());
        assert!(!is_pod_ready(&pod));
    }

    #[test]
    fn test_pod_completed() {
        assert!(is_pod_completed(&make_pod("Succeeded", "False")));
        assert!(is_pod_completed(&make_pod("Failed", "False")));
        assert!(!is_pod_completed(&make_pod("Running", "True")));
        assert!(!is_pod_completed(&Pod::default()));
    }

    #[test]
    fn test_statefulset_ready() {
        assert!(is_statefulset_ready(&make_statefulset(Some(3), Some(3), 2, 2)));
        assert!(!is_statefulset_ready(&make_statefulset(Some(3), Some(2), 2, 2)));
        assert!(!is_statefulset_ready(&make_statefulset(Some(3), Some(3), 3, 2)));
        assert!(!is_statefulset_ready(&StatefulSet::default()));
    }

    #[test]
    fn test_statefulset_replicas_default_to_one() {
        assert!(is_statefulset_ready(&make_statefulset(None, Some(1), 1, 1)));
        assert!(!is_statefulset_ready(&make_statefulset(None, None, 1, 1)));
    }
}

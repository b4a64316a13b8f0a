// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod conditions;
pub mod helpers;
pub mod waiter;

pub use helpers::{
    wait_for_job_to_complete, wait_for_job_to_succeed, wait_for_pod_ready,
    wait_for_statefulset_ready,
};
pub use waiter::ConditionWaiter;

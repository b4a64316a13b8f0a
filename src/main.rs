// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use k8s_openapi::api::batch::v1::Job;
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use informant::config::Config;
use informant::informer::{wait_for_cache_sync, CacheSync};
use informant::kubernetes::KubeControlPlane;
use informant::types::{ChangeEvent, ResourceSnapshot};
use informant::wait::wait_for_job_to_succeed;
use informant::{ConditionWaiter, Informer, ListFilter};

fn log_event(event: &ChangeEvent<Job>) {
    match event {
        ChangeEvent::Error(e) => error!("Job watch failed: {}", e),
        _ => {
            if let Some(snapshot) = event.snapshot() {
                let succeeded = snapshot.status.as_ref().and_then(|s| s.succeeded).unwrap_or(0);
                info!("{:?} {} (succeeded={})", event.kind(), snapshot.key(), succeeded);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting informant");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: namespace={}, label_selector={:?}",
        config.namespace, config.label_selector
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let mut filter = ListFilter::namespaced(&config.namespace);
    if let Some(selector) = &config.label_selector {
        filter = filter.labels(selector);
    }

    let control_plane = Arc::new(KubeControlPlane::<Job>::new(client));
    let informer = Arc::new(Informer::new(control_plane, filter, config.watch.clone()));
    informer.add_event_handler(None::<fn(&ResourceSnapshot<Job>) -> bool>, log_event);

    let shutdown = CancellationToken::new();
    informer.start(&shutdown);

    wait_for_cache_sync(&[informer.as_ref() as &dyn CacheSync], &shutdown)
        .await
        .context("Job cache failed to sync")?;
    info!("Job cache synced with {} jobs", informer.store().len());

    if let Some(name) = &config.wait_job_name {
        let waiter = ConditionWaiter::from_informer(informer.clone());
        let result = tokio::select! {
            result = wait_for_job_to_succeed(
                &waiter,
                &config.namespace,
                name,
                config.wait_timeout,
            ) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                shutdown.cancel();
                return Ok(());
            }
        };
        shutdown.cancel();
        let job = result.with_context(|| format!("Job {} did not succeed", name))?;
        info!("Job {} succeeded", job.key());
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    shutdown.cancel();
    Ok(())
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::{ResourceKey, ResourceSnapshot};
use std::fmt::Debug;
use thiserror::Error;

/// Failures reported by the control plane or by a watch session.
///
/// Cloneable so it can travel inside a `ChangeEvent::Error` to every consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Resource version too old: {0}")]
    StaleResourceVersion(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Watch session closed: {0}")]
    Closed(String),
}

impl Error {
    /// Errors a watch session recovers from on its own by backing off and relisting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::StaleResourceVersion(_))
    }

    /// Classify an API status code the way the engine cares about it.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            401 => Error::Unauthorized(message),
            403 => Error::Forbidden(message),
            404 => Error::NotFound(message),
            410 => Error::StaleResourceVersion(message),
            400..=499 => Error::Api { code, message },
            _ => Error::Transport(message),
        }
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => Error::from_status(resp.code, resp.message),
            other => Error::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Terminal outcomes of a `ConditionWaiter` call other than success.
#[derive(Error, Debug)]
pub enum WaitError<K: Debug> {
    /// The condition never held before the deadline. `last` is the most recent
    /// snapshot observed for the key, if any.
    #[error("Condition on {key} not met before timeout")]
    ConditionTimeout {
        key: ResourceKey,
        last: Option<ResourceSnapshot<K>>,
    },

    #[error("Wait on {key} was cancelled")]
    Cancelled { key: ResourceKey },

    /// The engine lost the ability to observe the resource.
    #[error("Watch on {key} failed: {source}")]
    WatchFailed {
        key: ResourceKey,
        #[source]
        source: Error,
    },
}

impl<K: Debug> WaitError<K> {
    pub fn key(&self) -> &ResourceKey {
        match self {
            WaitError::ConditionTimeout { key, .. }
            | WaitError::Cancelled { key }
            | WaitError::WatchFailed { key, .. } => key,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::ConditionTimeout { .. })
    }
}

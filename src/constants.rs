// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Watch session retry configuration
pub mod backoff {
    /// Initial delay in milliseconds before retrying a failed list or watch
    pub const INITIAL_MS: u64 = 500;
    /// Maximum delay in seconds (exponential backoff cap)
    pub const MAX_SECS: u64 = 30;
}

/// Defaults for the binary
pub mod defaults {
    /// Namespace watched when WATCH_NAMESPACE is not set
    pub const NAMESPACE: &str = "default";
    /// Seconds to wait for a job when WAIT_TIMEOUT_SECS is not set
    pub const WAIT_TIMEOUT_SECS: u64 = 300;
}

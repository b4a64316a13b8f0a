// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::config::WatchConfig;
use std::time::Duration;

/// Doubling retry delay with a cap and an optional retry budget.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
    attempts: u32,
    max_retries: Option<u32>,
}

impl Backoff {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            initial: config.backoff_initial,
            max: config.backoff_max,
            next: config.backoff_initial,
            attempts: 0,
            max_retries: config.max_retries,
        }
    }

    /// Delay before the next attempt, or `None` once the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_retries.is_some_and(|max| self.attempts >= max) {
            return None;
        }
        self.attempts += 1;
        let delay = self.next.min(self.max);
        self.next = self.next.saturating_mul(2).min(self.max);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

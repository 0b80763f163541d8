use std::time::Duration;

use chrono::NaiveDate;
use harvester_core::{dedup_groups, TerminationPolicy, DEFAULT_FINGERPRINT_PREFIX};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{DateWindow, PacingConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("commit_batch must be at least 1")]
    ZeroBatch,
    #[error("{name} range is inverted ({min_ms}ms > {max_ms}ms)")]
    InvertedRange {
        name: &'static str,
        min_ms: u64,
        max_ms: u64,
    },
    #[error("{0} retry attempts must be at least 1")]
    ZeroAttempts(&'static str),
    #[error("fingerprint prefix must be at least one character")]
    ZeroFingerprintPrefix,
}

/// Bounded retry with exponential backoff starting at `backoff_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff_ms: 250,
        }
    }
}

impl RetrySettings {
    /// Backoff before retry number `retry` (1-based): doubles each time.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintSettings {
    pub enabled: bool,
    pub prefix_chars: usize,
}

impl Default for FingerprintSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix_chars: DEFAULT_FINGERPRINT_PREFIX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub groups: Vec<String>,
    pub row_limit: Option<u64>,
    pub session_row_cap: Option<u64>,
    pub attempt_cap: Option<u64>,
    pub max_rounds: Option<u64>,
    pub max_idle_rounds: u32,
    pub timeout_seconds: Option<u64>,
    /// Restricts the source to the last N days, ending today.
    pub since_days: Option<u32>,
    pub commit_batch: usize,
    pub advance_retry: RetrySettings,
    pub store_retry: RetrySettings,
    pub ready_attempts: u32,
    pub pacing: PacingConfig,
    pub fingerprint: FingerprintSettings,
    pub between_groups_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            row_limit: None,
            session_row_cap: None,
            attempt_cap: None,
            max_rounds: None,
            max_idle_rounds: 2,
            timeout_seconds: None,
            since_days: None,
            commit_batch: 20,
            advance_retry: RetrySettings::default(),
            store_retry: RetrySettings {
                attempts: 3,
                backoff_ms: 200,
            },
            ready_attempts: 3,
            pacing: PacingConfig::default(),
            fingerprint: FingerprintSettings::default(),
            between_groups_ms: 2000,
        }
    }
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commit_batch == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        for (name, range) in self.pacing.ranges() {
            if !range.is_valid() {
                return Err(ConfigError::InvertedRange {
                    name,
                    min_ms: range.min_ms,
                    max_ms: range.max_ms,
                });
            }
        }
        if self.advance_retry.attempts == 0 {
            return Err(ConfigError::ZeroAttempts("advance"));
        }
        if self.store_retry.attempts == 0 {
            return Err(ConfigError::ZeroAttempts("store"));
        }
        if self.ready_attempts == 0 {
            return Err(ConfigError::ZeroAttempts("ready"));
        }
        if self.fingerprint.enabled && self.fingerprint.prefix_chars == 0 {
            return Err(ConfigError::ZeroFingerprintPrefix);
        }
        Ok(())
    }

    /// Configured groups, blank entries dropped and case-insensitive
    /// duplicates removed.
    pub fn group_keys(&self) -> Vec<String> {
        dedup_groups(self.groups.iter().map(String::as_str))
    }

    pub fn termination_policy(&self) -> TerminationPolicy {
        TerminationPolicy {
            timeout: self.timeout_seconds.map(Duration::from_secs),
            row_limit: self.row_limit,
            session_row_cap: self.session_row_cap,
            attempt_cap: self.attempt_cap,
            max_rounds: self.max_rounds,
            max_idle_rounds: self.max_idle_rounds,
        }
    }

    pub fn date_window(&self, today: NaiveDate) -> Option<DateWindow> {
        self.since_days
            .map(|days| DateWindow::last_days(today, days))
    }
}

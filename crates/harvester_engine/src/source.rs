use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("could not open group {group_key}: {message}")]
    Open { group_key: String, message: String },
    #[error("could not read current items: {0}")]
    Read(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("login failed: {message}")]
pub struct AuthError {
    pub message: String,
}

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Inclusive publication-date bounds handed to sources that support them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl DateWindow {
    pub fn last_days(until: NaiveDate, days: u32) -> Self {
        Self {
            since: until - ChronoDuration::days(i64::from(days)),
            until,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.since <= date && date <= self.until
    }

    /// Search-operator form, e.g. `since:2024-01-01 until:2024-12-31`.
    pub fn query_suffix(&self) -> String {
        format!(
            "since:{} until:{}",
            self.since.format("%Y-%m-%d"),
            self.until.format("%Y-%m-%d")
        )
    }
}

/// Paginated or streaming item source driven by the harvest loop.
///
/// A round is whatever `current_items` returns: every visible item for
/// timeline walkers, a single open item for one-at-a-time walkers.
#[async_trait::async_trait]
pub trait Source: Send {
    type Cursor: Send + Sync;

    /// Navigates to the entry point of `group_key`.
    async fn open(&mut self, group_key: &str, window: Option<DateWindow>)
        -> Result<(), SourceError>;

    /// Waits, bounded by the source's own timeout, until content is present.
    async fn ready(&mut self) -> bool;

    /// Items of the current round, in traversal order.
    async fn current_items(&mut self) -> Result<Vec<Self::Cursor>, SourceError>;

    /// Moves past the current round. `false` means the source could not move.
    async fn advance(&mut self) -> bool;
}

/// Session authentication, performed once before any group is harvested.
#[async_trait::async_trait]
pub trait Authenticator: Send {
    async fn login(&mut self) -> Result<(), AuthError>;
}

/// Authenticator for sources that need no login.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLogin;

#[async_trait::async_trait]
impl Authenticator for NoLogin {
    async fn login(&mut self) -> Result<(), AuthError> {
        Ok(())
    }
}

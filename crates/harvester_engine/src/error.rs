use thiserror::Error;

use crate::{AuthError, ConfigError};

/// Run-level failures. Everything below this level ends a single group at
/// most and is reported through its `RunSummary`.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not start engine runtime: {0}")]
    Runtime(String),
    #[error("engine thread panicked")]
    Panicked,
}

//! Error types for the digest pipeline.

use thiserror::Error;

use crate::config::ConfigError;
use crate::digest::DispatchError;
use crate::index::HttpError;

/// Errors that end a digest run.
///
/// Per-record problems never show up here: malformed records are skipped and
/// logged where they are parsed.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Configuration was rejected before any network call.
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// A call to the literature index failed after all retries.
    #[error("Fetch failed during {stage}: {source}")]
    FetchFailed {
        stage: &'static str,
        #[source]
        source: HttpError,
    },

    /// Mail transport rejected the digest.
    #[error("Failed to dispatch digest: {0}")]
    Dispatch(#[source] DispatchError),
}

impl DigestError {
    /// Wrap an HTTP failure with the stage that issued it.
    pub fn fetch(stage: &'static str, source: HttpError) -> Self {
        Self::FetchFailed { stage, source }
    }

    /// True when the run failed because the index could not be reached.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, DigestError>;

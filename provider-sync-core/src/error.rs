//! Error type shared by every stage of the sync pipeline.
//!
//! Lookup failures (`NotFound`, `Network`, `InvalidReference`) are per-package and are
//! turned into skips by the orchestrator. Everything that happens after regeneration
//! has started (`Generation`, `Merge`, `Record`) aborts the run, as does a failed
//! hand-off (`Staging`).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// No upstream reference, version or release could be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP request failed or timed out.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider reference embedded in a manifest could not be decoded.
    #[error("invalid provider reference: {0}")]
    InvalidReference(String),

    /// An external tool exited non-zero, could not be spawned, or its output was unusable.
    #[error("generation failed during {stage}: {message}{}", output.as_ref().map(|o| format!("\n{o}")).unwrap_or_default())]
    Generation {
        stage: String,
        message: String,
        /// Captured stderr/stdout of the failing tool, if any.
        output: Option<String>,
    },

    /// Copying generated artifacts into the package directory failed.
    #[error("merge failed at {}: {source}", path.display())]
    Merge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the changelog or release-note fragment failed.
    #[error("failed to record update at {}: {source}", path.display())]
    Record {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The release-staging hand-off failed.
    #[error("release staging failed: {0}")]
    Staging(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn generation(stage: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Generation {
            stage: stage.into(),
            message: message.into(),
            output: None,
        }
    }

    /// Whether this error must stop the whole run rather than skip a package.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SyncError::NotFound(_) | SyncError::Network(_) | SyncError::InvalidReference(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

//! Error types for configuration and extraction tasks.

use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::TaskStage;
use crate::types::{ExtractionResult, FailureKind, GuardState};

/// Errors raised while assembling an [`ExtractorConfig`](crate::config::ExtractorConfig).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read selector catalog {}: {source}", path.display())]
    CatalogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse selector catalog {}: {source}", path.display())]
    CatalogParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything that can end an extraction task early.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("failed to create a rendering session after {attempts} attempts: {last_error}")]
    SessionCreation { attempts: u32, last_error: String },

    #[error("page is not accessible: {0}")]
    Guard(GuardState),

    #[error("could not locate {field}{}", hint.map(|h| format!(" ({h})")).unwrap_or_default())]
    MissingField {
        field: &'static str,
        hint: Option<&'static str>,
    },

    #[error("task deadline of {after:?} exceeded after reaching {stage}")]
    Timeout { stage: TaskStage, after: Duration },

    #[error("task panicked after reaching {stage}: {message}")]
    Panicked { stage: TaskStage, message: String },

    #[error(transparent)]
    Render(#[from] anyhow::Error),
}

impl ExtractError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ExtractError::SessionCreation { .. } => FailureKind::SessionCreation,
            ExtractError::Guard(state) => FailureKind::GuardBlocked(*state),
            ExtractError::MissingField { .. } => FailureKind::Extraction,
            ExtractError::Timeout { .. } => FailureKind::Timeout,
            ExtractError::Panicked { .. } | ExtractError::Render(_) => FailureKind::Unexpected,
        }
    }
}

impl From<ExtractError> for ExtractionResult {
    fn from(err: ExtractError) -> Self {
        let message = match &err {
            ExtractError::Render(inner) => format!("unexpected failure: {inner:#}"),
            other => other.to_string(),
        };
        ExtractionResult::failure(err.failure_kind(), message)
    }
}

pub type ExtractResult<T> = Result<T, ExtractError>;

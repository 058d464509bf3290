use thiserror::Error;

use crate::models::Stage;

/// A text, image or speech generation request failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("provider returned status={status} body={body}")]
    Api { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Retrieving a generated image for embedding failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("invalid inline image: {0}")]
    InlineData(String),
    #[error("unsupported image format: {0}")]
    Format(String),
}

/// Document assembly failed for reasons other than missing illustrations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("pdf error: {0}")]
    Pdf(String),
    #[error("font error: {0}")]
    Font(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("cannot run {stage}: {missing} has not been generated yet")]
    MissingPrerequisite { stage: Stage, missing: &'static str },
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },
    #[error("field unavailable: {0}")]
    FieldUnavailable(String),
}

impl WorkflowError {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Provider(_) => "provider_error",
            WorkflowError::Fetch(_) => "fetch_error",
            WorkflowError::Export(_) => "export_error",
            WorkflowError::MissingPrerequisite { .. } => "missing_prerequisite",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::FieldUnavailable(_) => "field_unavailable",
        }
    }
}

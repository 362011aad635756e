//! Crate-level error taxonomy.

use crate::events::StreamError;
use crate::microagent::LoadError;

/// Errors surfaced by the recall core.
///
/// Ingestion problems are normally swallowed close to where they occur
/// (empty maps plus a warning); only structural stream errors are
/// expected to propagate to callers as hard failures.
#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    #[error("event stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("microagent ingestion error: {0}")]
    Load(#[from] LoadError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recall operations.
pub type Result<T> = std::result::Result<T, RecallError>;

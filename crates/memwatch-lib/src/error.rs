//! Error types for the telemetry engine

use thiserror::Error;

/// Errors surfaced by the engine
///
/// Missing data is never an error here: unknown systems and short windows
/// are reported as empty values by the query and detector APIs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A single ingested record could not be turned into a snapshot
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// Engine configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        EngineError::MalformedRecord(reason.into())
    }

    /// Returns true if only the offending record should be dropped
    pub fn is_record_local(&self) -> bool {
        matches!(self, EngineError::MalformedRecord(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

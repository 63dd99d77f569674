//! Error types for the rendering pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single rejected input field
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ValidationIssue {
    /// Field name as it appears in the request (camelCase)
    pub field: String,
    /// Human-readable explanation
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while building or capturing a report
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input
    #[error("Validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// Invalid environment configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The rendering engine could not be launched or reconnected
    #[error("Rendering engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The document reported a failure through its error flag
    #[error("Rendering failed: {0}")]
    Render(String),

    /// A bounded wait expired
    #[error("Operation timed out after {ms}ms while {stage}")]
    Timeout { stage: &'static str, ms: u64 },

    /// The engine connection failed or dropped mid-flight
    #[error("Browser error: {0}")]
    Browser(String),

    /// Anything unclassified, including broken internal contracts
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            Error::Render(_) => "RENDER_ERROR",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Browser(_) => "BROWSER_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Issues attached to a validation failure, empty for every other kind
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Error::Validation(issues) => issues,
            _ => &[],
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

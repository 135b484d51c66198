use thiserror::Error;
use toolhost_plan::PlanError;
use toolhost_protocol::{ErrorEnvelope, ErrorKind};

pub type Result<T> = std::result::Result<T, ToolError>;

/// Typed failure of a single invocation or of a batch pre-check.
///
/// Handlers return `anyhow::Result`; wrapping one of these variants in the `anyhow::Error`
/// keeps its kind through the dispatcher, anything else is reported as [`ToolError::ToolFailure`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous: {message} ({count} candidates)")]
    Ambiguous { count: usize, message: String },

    #[error("Execution plan has {leaves} invocations (max {max})")]
    PlanTooLarge { leaves: usize, max: usize },

    #[error("{0}")]
    ToolFailure(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl ToolError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::OutOfBounds(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn ambiguous(count: usize, message: impl Into<String>) -> Self {
        Self::Ambiguous {
            count,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::OutOfBounds(_) => ErrorKind::OutOfBounds,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Ambiguous { .. } => ErrorKind::Ambiguous,
            Self::PlanTooLarge { .. } => ErrorKind::PlanTooLarge,
            Self::ToolFailure(_) => ErrorKind::ToolFailure,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        let envelope = ErrorEnvelope::new(self.kind(), self.to_string());
        match self {
            Self::Ambiguous { count, .. } => envelope
                .with_details(serde_json::json!({ "count": count }))
                .with_hint("Add surrounding text (context before/after) so exactly one occurrence matches."),
            Self::PlanTooLarge { leaves, max } => envelope
                .with_details(serde_json::json!({ "leaves": leaves, "max": max }))
                .with_hint("Split the batch into several smaller batches."),
            Self::OutOfBounds(_) => envelope.with_hint(
                "Use a relative path that starts with a project root name and stays inside it.",
            ),
            _ => envelope,
        }
    }
}

impl From<PlanError> for ToolError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Empty => Self::InvalidInput(err.to_string()),
            PlanError::TooLarge { leaves, max } => Self::PlanTooLarge { leaves, max },
        }
    }
}

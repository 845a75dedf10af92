use sea_orm::error::DbErr;

/// Crate-wide error type for the forecasting pipeline.
///
/// Business-rule failures (`InvalidRequest`, `NotFound`, `InsufficientData`,
/// `NotImplemented`) carry human-readable messages and are surfaced to the
/// caller as-is. Unexpected failures are translated to `InternalError` at the
/// orchestration boundary after being logged with full context.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        ServiceError::InsufficientData(message.into())
    }

    /// True when the error is a caller mistake rather than a pipeline fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidRequest(_)
                | ServiceError::NotFound(_)
                | ServiceError::ValidationError(_)
        )
    }
}

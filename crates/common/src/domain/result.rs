use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),

    #[error("Location provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Webhook signature invalid")]
    SignatureInvalid,

    #[error("Webhook payload is missing the external identifier")]
    MissingIdentifier,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("No active operator matches external id: {0}")]
    NoMatchingOperator(String),

    #[error("Schema violation on field {field}: {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl DomainError {
    pub fn schema_violation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Store or provider outages; the unit of work is skipped and retried on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DomainError::RepositoryError(_) | DomainError::ProviderUnavailable(_)
        )
    }
}

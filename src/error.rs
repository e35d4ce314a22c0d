use thiserror::Error;

use crate::billing::validation::ValidationError;

/// Error taxonomy for a billing pass. Validation and unsupported-feature
/// errors are reported per product/item and cause that unit to be skipped;
/// external-service errors are caught at the product boundary and never
/// abort the whole pass.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("external service error: {0}")]
    ExternalService(String),
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unsupported feature: {0}")]
    Unsupported(String),
}

impl BillingError {
    pub fn external(context: impl Into<String>) -> Self {
        BillingError::ExternalService(context.into())
    }

    /// True for errors raised by a collaborator call rather than by our
    /// own input checks.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            BillingError::ExternalService(_) | BillingError::Http(_)
        )
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

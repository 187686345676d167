use control_core::error::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("store error: {0}")]
    Store(#[from] control_db::DbError),

    #[error("webhook signature verification failed")]
    InvalidSignature,

    #[error("webhook payload could not be parsed: {0}")]
    MalformedPayload(String),

    #[error("billing sink rejected the export: {0}")]
    SinkRejected(String),
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        let kind = match &err {
            BillingError::InvalidSignature => ErrorKind::AuthError,
            BillingError::MalformedPayload(_) => ErrorKind::InvalidRequest,
            BillingError::Store(_) | BillingError::SinkRejected(_) => ErrorKind::InternalError,
        };
        ApiError::new(kind, err.to_string())
    }
}

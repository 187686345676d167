use control_core::error::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("provisioning backend is unavailable: {0}")]
    ProvisioningUnavailable(String),

    #[error("manifest field failed validation: {0}")]
    InvalidManifest(String),

    #[error("store error: {0}")]
    Store(#[from] control_db::DbError),

    #[error("failed to launch provisioning process: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        let kind = match &err {
            LifecycleError::ProvisioningUnavailable(_) => ErrorKind::ProvisioningUnavailable,
            LifecycleError::InvalidManifest(_) => ErrorKind::ValidationError,
            LifecycleError::Store(_) | LifecycleError::Io(_) => ErrorKind::InternalError,
        };
        ApiError::new(kind, err.to_string())
    }
}

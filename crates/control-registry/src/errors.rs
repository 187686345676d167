use control_core::error::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("node {0} is not registered")]
    UnknownNode(uuid::Uuid),

    #[error("store error: {0}")]
    Store(#[from] control_db::DbError),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let kind = match &err {
            RegistryError::UnknownNode(_) => ErrorKind::NotFound,
            RegistryError::Store(_) => ErrorKind::InternalError,
        };
        ApiError::new(kind, err.to_string())
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("failed to map row to domain type: {0}")]
    Mapping(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

use crate::errors::DbError;
use crate::schema::apply_schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tracing::{info, instrument};

/// Wraps a `libsql::Database` — an embedded local file, an in-memory
/// database, or a remote Turso-compatible endpoint, selected by URL
/// scheme. In-memory databases need one connection kept open for the
/// lifetime of the process or SQLite reclaims the schema the moment the
/// bootstrap connection closes.
#[derive(Clone)]
pub struct DbClient {
    database: Arc<Database>,
    memory_anchor: Option<Arc<Connection>>,
}

impl DbClient {
    #[instrument(skip(access_token))]
    pub async fn connect(url: &str, access_token: Option<String>) -> Result<Self, DbError> {
        if url.is_empty() {
            return Err(DbError::Connection("DATABASE_URL is not set".into()));
        }

        info!("connecting to persistent store at {url}");

        let is_remote = url.starts_with("libsql://") || url.starts_with("https://");
        let is_memory = url.contains(":memory:") || url.contains("mode=memory");

        let database = if is_remote {
            let token = access_token
                .ok_or_else(|| DbError::Connection("remote store requires an access token".into()))?;
            Builder::new_remote(url.to_string(), token)
                .build()
                .await
                .map_err(|e| DbError::Connection(e.to_string()))?
        } else {
            Builder::new_local(url)
                .build()
                .await
                .map_err(|e| DbError::Connection(e.to_string()))?
        };

        let database = Arc::new(database);
        let mut memory_anchor = None;

        if is_memory {
            let anchor = database
                .connect()
                .map_err(|e| DbError::Connection(e.to_string()))?;
            apply_schema(&anchor).await?;
            memory_anchor = Some(Arc::new(anchor));
        } else {
            let bootstrap = database
                .connect()
                .map_err(|e| DbError::Connection(e.to_string()))?;
            apply_schema(&bootstrap).await?;
        }

        Ok(Self {
            database,
            memory_anchor,
        })
    }

    pub fn connection(&self) -> Result<Connection, DbError> {
        self.database
            .connect()
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}

// Engine Driver
// Pooled tiberius connections; the backend DatabaseConfig reflects through

use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use tracing::info;

use crate::db::connection::{engine_url, redact_connection_string, ConnectionTarget};
use crate::db::schema;
use crate::db::traits::{DatabaseError, Introspector, Relation, RelationKind};
use crate::settings::ConnectOptions;

/// Type alias for the engine's connection pool
pub type EnginePool = Pool<ConnectionManager>;

/// A connection engine bound to one server and database
pub struct Engine {
    pool: EnginePool,
    url: String,
    label: String,
}

impl Engine {
    /// Build the engine and open its first connection.
    ///
    /// Fails if the server cannot be reached; there is no retry.
    pub async fn connect(
        target: &ConnectionTarget,
        options: &ConnectOptions,
    ) -> Result<Self, DatabaseError> {
        if options.pool_max_size == 0 {
            return Err(DatabaseError::InvalidConfig(
                "pool_max_size must be at least 1".to_string(),
            ));
        }

        let connection_string = target.connection_string_with(options)?;
        let url = engine_url(&redact_connection_string(&connection_string));

        let tiberius_config = target.to_tiberius_config(options)?;
        let manager = ConnectionManager::build(tiberius_config)
            .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(options.pool_max_size)
            .min_idle(Some(1))
            .retry_connection(false)
            .build(manager)
            .await
            .map_err(|e| DatabaseError::PoolError(e.to_string()))?;

        info!(%url, "created engine");

        Ok(Self {
            pool,
            url,
            label: target.label(),
        })
    }

    /// Engine URL with the password redacted
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `server.database`
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Introspector for Engine {
    async fn schema_names(&self) -> Result<Vec<String>, DatabaseError> {
        let mut conn = self.pool.get().await?;
        schema::fetch_schema_names(&mut conn).await
    }

    async fn table_names(&self, schema_name: &str) -> Result<Vec<String>, DatabaseError> {
        let mut conn = self.pool.get().await?;
        schema::fetch_relation_names(&mut conn, schema_name, RelationKind::Table).await
    }

    async fn view_names(&self, schema_name: &str) -> Result<Vec<String>, DatabaseError> {
        let mut conn = self.pool.get().await?;
        schema::fetch_relation_names(&mut conn, schema_name, RelationKind::View).await
    }

    async fn reflect(
        &self,
        schema_name: &str,
        name: &str,
        kind: RelationKind,
    ) -> Result<Relation, DatabaseError> {
        let mut conn = self.pool.get().await?;
        schema::fetch_relation(&mut conn, schema_name, name, kind).await
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// Database Module
// Connection strings, driver dispatch and table/view reflection

pub mod connection;
pub mod database_config;
pub mod drivers;
pub mod registry;
pub mod schema;
pub mod traits;

pub use connection::{
    engine_url, generate_sql_connection_string, redact_connection_string, ConnectionTarget,
};
pub use database_config::DatabaseConfig;
pub use registry::{connect, connect_with, Driver, SqlConnection};
pub use schema::SchemaMetadata;
pub use traits::{ColumnInfo, DatabaseError, Introspector, Relation, RelationKind};

#[cfg(feature = "engine")]
pub use drivers::{Engine, EnginePool};
#[cfg(feature = "odbc")]
pub use drivers::OdbcConnection;
pub use drivers::TdsClient;

// Reflection Traits and Shared Types
// Defines the error taxonomy, relation descriptors and the introspection seam

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::registry::Driver;

/// Common database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Unknown database connection driver: {0}. Options are: {options}", options = Driver::OPTIONS)]
    UnknownDriver(String),

    #[error("Cannot build connection string: a password was given without a user id")]
    ConnectionStringParsing,

    #[error("Schema: {schema} is missing from {server}.{database}")]
    MissingSchema {
        schema: String,
        server: String,
        database: String,
    },

    #[error("Table: {table} is missing from {server}.{database}.{schema}")]
    MissingTable {
        table: String,
        schema: String,
        server: String,
        database: String,
    },

    #[error("View: {view} is missing from {server}.{database}.{schema}")]
    MissingView {
        view: String,
        schema: String,
        server: String,
        database: String,
    },

    #[error("Must enable the `{feature}` feature to use the {driver} driver")]
    DriverUnavailable {
        driver: &'static str,
        feature: &'static str,
    },

    #[error("Integrated authentication is not available on this platform; supply a user id and password or enable the `gssapi` feature")]
    IntegratedAuthUnavailable,

    #[error("Password expired. Please change your password using another tool.")]
    PasswordExpired,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution error: {0}")]
    QueryError(String),

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<tiberius::error::Error> for DatabaseError {
    fn from(err: tiberius::error::Error) -> Self {
        // 18488: login failed because the password must be changed
        if let tiberius::error::Error::Server(e) = &err {
            if e.code() == 18488 {
                return DatabaseError::PasswordExpired;
            }
        }
        DatabaseError::ConnectionFailed(err.to_string())
    }
}

#[cfg(feature = "engine")]
impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for DatabaseError {
    fn from(err: bb8::RunError<E>) -> Self {
        DatabaseError::PoolError(err.to_string())
    }
}

#[cfg(feature = "odbc")]
impl From<odbc_api::Error> for DatabaseError {
    fn from(err: odbc_api::Error) -> Self {
        DatabaseError::ConnectionFailed(err.to_string())
    }
}

/// Whether a reflected relation is a base table or a view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Table,
    View,
}

impl RelationKind {
    /// `TABLE_TYPE` value in `INFORMATION_SCHEMA.TABLES`
    pub fn table_type(&self) -> &'static str {
        match self {
            RelationKind::Table => "BASE TABLE",
            RelationKind::View => "VIEW",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Table => f.write_str("Table"),
            RelationKind::View => f.write_str("View"),
        }
    }
}

/// Column information for a reflected relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_identity: bool,
    pub column_default: Option<String>,
    pub ordinal_position: i32,
}

/// A reflected table or view.
///
/// This is a snapshot taken when the relation was first bound; it never
/// refreshes itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub schema: String,
    pub name: String,
    pub kind: RelationKind,
    pub columns: Vec<ColumnInfo>,
}

impl Relation {
    /// `schema.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }
}

/// Live catalog access used by [`DatabaseConfig`](crate::DatabaseConfig).
///
/// Every method is a round trip to the server; implementations must not
/// cache name lists.
#[async_trait::async_trait]
pub trait Introspector: Send + Sync {
    /// Names of all schemas in the connected database
    async fn schema_names(&self) -> Result<Vec<String>, DatabaseError>;

    /// Names of base tables in `schema`
    async fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError>;

    /// Names of views in `schema`
    async fn view_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError>;

    /// Load the column layout of one relation
    async fn reflect(
        &self,
        schema: &str,
        name: &str,
        kind: RelationKind,
    ) -> Result<Relation, DatabaseError>;

    /// Allow downcasting to the concrete backend
    fn as_any(&self) -> &dyn std::any::Any;
}

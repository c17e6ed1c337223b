//! SQL Server connection helpers.
//!
//! Builds ODBC connection strings, opens connections through one of three
//! backends (`engine`, `odbc`, `tiberius`), and reflects tables and views
//! into a [`DatabaseConfig`] after checking that they exist.
//!
//! ```no_run
//! use sql_connect::{ConnectionTarget, DatabaseConfig};
//!
//! # #[cfg(feature = "engine")]
//! # async fn run() -> sql_connect::Result<()> {
//! let target = ConnectionTarget::new("sql01", "erp")
//!     .with_uid("report")
//!     .with_pwd("secret");
//! let mut config = DatabaseConfig::connect(target).await?;
//! config.set_table("orders", None, Some("sales")).await?;
//! config.set_view("open_orders", Some("open"), None).await?;
//! println!("{config}");
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod settings;

pub use db::{
    connect, connect_with, engine_url, generate_sql_connection_string, ColumnInfo,
    ConnectionTarget, DatabaseConfig, Driver, Introspector, Relation, RelationKind,
    SchemaMetadata, SqlConnection,
};
pub use db::DatabaseError as Error;
pub use settings::ConnectOptions;

#[cfg(feature = "engine")]
pub use db::Engine;

pub type Result<T, E = Error> = std::result::Result<T, E>;

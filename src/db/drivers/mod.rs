// Database Drivers
// One module per backend; each sits behind its own Cargo feature

#[cfg(feature = "engine")]
pub mod engine;
#[cfg(feature = "odbc")]
pub mod odbc;
#[cfg(feature = "tds")]
pub mod tds;

use tokio::net::TcpStream;
use tokio_util::compat::Compat;

/// A single tiberius client over tokio TCP
pub type TdsClient = tiberius::Client<Compat<TcpStream>>;

#[cfg(feature = "engine")]
pub use engine::{Engine, EnginePool};
#[cfg(feature = "odbc")]
pub use odbc::OdbcConnection;

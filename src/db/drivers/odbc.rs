// ODBC Driver
// Connects through the host's ODBC driver manager using the built connection string

use std::sync::OnceLock;

use odbc_api::{Connection, ConnectionOptions, Environment};
use tracing::info;

use crate::db::connection::redact_connection_string;
use crate::db::traits::DatabaseError;

static ODBC_ENV: OnceLock<Environment> = OnceLock::new();

/// Connection handle returned by the ODBC backend
pub type OdbcConnection = Connection<'static>;

/// Process-wide ODBC environment, created on first use
fn environment() -> Result<&'static Environment, DatabaseError> {
    if let Some(env) = ODBC_ENV.get() {
        return Ok(env);
    }
    let env = Environment::new()?;
    Ok(ODBC_ENV.get_or_init(|| env))
}

/// Open an ODBC connection. The driver call blocks, so it runs off the async workers.
pub async fn connect(connection_string: String) -> Result<OdbcConnection, DatabaseError> {
    let redacted = redact_connection_string(&connection_string);

    let connection = tokio::task::spawn_blocking(move || -> Result<OdbcConnection, DatabaseError> {
        let env = environment()?;
        let connection =
            env.connect_with_connection_string(&connection_string, ConnectionOptions::default())?;
        Ok(connection)
    })
    .await
    .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))??;

    info!(connection = %redacted, "opened odbc connection");
    Ok(connection)
}

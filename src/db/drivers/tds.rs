// Direct TDS Driver
// Opens one unpooled tiberius client for a connection target

use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;
use tracing::info;

use crate::db::connection::ConnectionTarget;
use crate::db::drivers::TdsClient;
use crate::db::traits::DatabaseError;
use crate::settings::ConnectOptions;

/// Connect straight to the server.
///
/// Uses a SQL login when both user id and password are present and
/// integrated authentication otherwise.
pub async fn connect(
    target: &ConnectionTarget,
    options: &ConnectOptions,
) -> Result<TdsClient, DatabaseError> {
    let config = target.to_tiberius_config(options)?;
    let addr = config.get_addr();

    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(format!("TCP connection failed: {}", e)))?;

    tcp.set_nodelay(true)
        .map_err(|e| DatabaseError::ConnectionFailed(format!("Failed to set TCP_NODELAY: {}", e)))?;

    let client = tiberius::Client::connect(config, tcp.compat_write()).await?;

    info!(connection = %target.label(), %addr, "opened tiberius connection");
    Ok(client)
}

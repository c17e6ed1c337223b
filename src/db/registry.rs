// Driver Registry
// Maps driver tags to backends and opens connections through them

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::connection::{redact_connection_string, ConnectionTarget};
use crate::db::traits::DatabaseError;
use crate::settings::ConnectOptions;

#[cfg(feature = "engine")]
use crate::db::drivers::Engine;
#[cfg(feature = "odbc")]
use crate::db::drivers::OdbcConnection;
#[cfg(feature = "tds")]
use crate::db::drivers::TdsClient;

/// Connection backends
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Pooled engine
    #[default]
    Engine,
    /// ODBC driver manager
    Odbc,
    /// Single tiberius client
    Tiberius,
}

impl Driver {
    pub const ALL: [Driver; 3] = [Driver::Engine, Driver::Odbc, Driver::Tiberius];

    /// Valid tags, as listed in [`DatabaseError::UnknownDriver`]
    pub const OPTIONS: &'static str = "engine, odbc, tiberius";

    pub fn tag(&self) -> &'static str {
        match self {
            Driver::Engine => "engine",
            Driver::Odbc => "odbc",
            Driver::Tiberius => "tiberius",
        }
    }

    /// Cargo feature that compiles the backend in
    pub fn feature(&self) -> &'static str {
        match self {
            Driver::Engine => "engine",
            Driver::Odbc => "odbc",
            Driver::Tiberius => "tds",
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Driver::Engine => cfg!(feature = "engine"),
            Driver::Odbc => cfg!(feature = "odbc"),
            Driver::Tiberius => cfg!(feature = "tds"),
        }
    }

    /// Drivers compiled into this build
    pub fn available() -> Vec<Driver> {
        Self::ALL.into_iter().filter(Driver::is_available).collect()
    }

    fn unavailable(&self) -> DatabaseError {
        DatabaseError::DriverUnavailable {
            driver: self.tag(),
            feature: self.feature(),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Driver {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|driver| driver.tag() == s)
            .ok_or_else(|| DatabaseError::UnknownDriver(s.to_string()))
    }
}

/// A live connection from one of the backends
pub enum SqlConnection {
    #[cfg(feature = "engine")]
    Engine(Engine),
    #[cfg(feature = "odbc")]
    Odbc(OdbcConnection),
    #[cfg(feature = "tds")]
    Tiberius(TdsClient),
}

impl SqlConnection {
    pub fn driver(&self) -> Driver {
        // a place match lets the enum be empty when every backend is compiled out
        match *self {
            #[cfg(feature = "engine")]
            SqlConnection::Engine(_) => Driver::Engine,
            #[cfg(feature = "odbc")]
            SqlConnection::Odbc(_) => Driver::Odbc,
            #[cfg(feature = "tds")]
            SqlConnection::Tiberius(_) => Driver::Tiberius,
        }
    }
}

/// Open a connection through the backend named by `driver`.
///
/// The connection string is built before the tag is examined, so a bad
/// credential combination is reported ahead of an unknown tag.
pub async fn connect(target: &ConnectionTarget, driver: &str) -> Result<SqlConnection, DatabaseError> {
    target.connection_string()?;
    let driver = driver.parse::<Driver>()?;
    connect_with(target, driver, &ConnectOptions::default()).await
}

/// Typed variant of [`connect`]
pub async fn connect_with(
    target: &ConnectionTarget,
    driver: Driver,
    options: &ConnectOptions,
) -> Result<SqlConnection, DatabaseError> {
    let connection_string = target.connection_string_with(options)?;
    debug!(
        %driver,
        connection = %redact_connection_string(&connection_string),
        "connecting"
    );

    match driver {
        #[cfg(feature = "engine")]
        Driver::Engine => Ok(SqlConnection::Engine(Engine::connect(target, options).await?)),

        #[cfg(feature = "odbc")]
        Driver::Odbc => Ok(SqlConnection::Odbc(
            crate::db::drivers::odbc::connect(connection_string).await?,
        )),

        #[cfg(feature = "tds")]
        Driver::Tiberius => Ok(SqlConnection::Tiberius(
            crate::db::drivers::tds::connect(target, options).await?,
        )),

        #[allow(unreachable_patterns)]
        other => Err(other.unavailable()),
    }
}

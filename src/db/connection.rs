// Connection Targets and Connection Strings
// Builds ODBC connection strings and tiberius configs from server/database/credentials

use serde::{Deserialize, Serialize};
use tiberius::{AuthMethod, Config, EncryptionLevel};
use url::form_urlencoded;

use crate::db::traits::DatabaseError;
use crate::settings::ConnectOptions;

/// ODBC driver name used by [`generate_sql_connection_string`]
pub const DEFAULT_ODBC_DRIVER: &str = "SQL Server";

/// Server, database and optional credentials for one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub server: String,
    pub database: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default, skip_serializing)] // Don't serialize password
    pub pwd: Option<String>,
}

impl ConnectionTarget {
    /// Target using integrated authentication
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            database: database.into(),
            uid: None,
            pwd: None,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_pwd(mut self, pwd: impl Into<String>) -> Self {
        self.pwd = Some(pwd.into());
        self
    }

    /// `server.database`, as used in error messages
    pub fn label(&self) -> String {
        format!("{}.{}", self.server, self.database)
    }

    pub fn connection_string(&self) -> Result<String, DatabaseError> {
        generate_sql_connection_string(
            &self.server,
            &self.database,
            self.uid.as_deref(),
            self.pwd.as_deref(),
        )
    }

    /// Like [`connection_string`](Self::connection_string) with the ODBC driver name taken from `options`
    pub fn connection_string_with(&self, options: &ConnectOptions) -> Result<String, DatabaseError> {
        format_connection_string(
            &options.odbc_driver,
            &self.server,
            &self.database,
            self.uid.as_deref(),
            self.pwd.as_deref(),
        )
    }

    /// Create a tiberius Config from this target
    pub fn to_tiberius_config(&self, options: &ConnectOptions) -> Result<Config, DatabaseError> {
        let (host, port) = self.host_and_port(options.port)?;

        let mut config = Config::new();
        config.host(host);
        config.port(port);
        config.database(&self.database);
        config.authentication(self.auth_method()?);

        if let Some(name) = &options.application_name {
            config.application_name(name);
        }

        if options.trust_cert {
            config.trust_cert();
        }

        config.encryption(if options.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });

        Ok(config)
    }

    /// Split `tcp:host,port` / `host,port` / `host`
    fn host_and_port(&self, default_port: u16) -> Result<(&str, u16), DatabaseError> {
        let server = self.server.strip_prefix("tcp:").unwrap_or(&self.server);
        match server.split_once(',') {
            Some((host, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| {
                    DatabaseError::InvalidConfig(format!("Invalid port in server name: {}", self.server))
                })?;
                Ok((host.trim(), port))
            }
            None => Ok((server, default_port)),
        }
    }

    /// SQL login when both credentials are present, integrated auth otherwise
    fn auth_method(&self) -> Result<AuthMethod, DatabaseError> {
        match (&self.uid, &self.pwd) {
            (Some(uid), Some(pwd)) => Ok(AuthMethod::sql_server(uid, pwd)),
            (None, Some(_)) => Err(DatabaseError::ConnectionStringParsing),
            _ => integrated_auth(),
        }
    }
}

#[cfg(any(windows, all(unix, feature = "gssapi")))]
fn integrated_auth() -> Result<AuthMethod, DatabaseError> {
    Ok(AuthMethod::Integrated)
}

#[cfg(not(any(windows, all(unix, feature = "gssapi"))))]
fn integrated_auth() -> Result<AuthMethod, DatabaseError> {
    Err(DatabaseError::IntegratedAuthUnavailable)
}

/// Build an ODBC connection string for `server`/`database`.
///
/// Without a password the string requests a trusted (integrated) connection,
/// carrying `uid` if one was given. A password without a user id is rejected
/// with [`DatabaseError::ConnectionStringParsing`].
pub fn generate_sql_connection_string(
    server: &str,
    database: &str,
    uid: Option<&str>,
    pwd: Option<&str>,
) -> Result<String, DatabaseError> {
    format_connection_string(DEFAULT_ODBC_DRIVER, server, database, uid, pwd)
}

fn format_connection_string(
    driver: &str,
    server: &str,
    database: &str,
    uid: Option<&str>,
    pwd: Option<&str>,
) -> Result<String, DatabaseError> {
    match (uid, pwd) {
        (uid, None) => Ok(format!(
            "DRIVER={{{}}};SERVER={};DATABASE={};UID={};Trusted_Connection=Yes",
            driver,
            server,
            database,
            uid.unwrap_or("")
        )),
        (None, Some(_)) => Err(DatabaseError::ConnectionStringParsing),
        (Some(uid), Some(pwd)) => Ok(format!(
            "DRIVER={{{}}};SERVER={};DATABASE={};UID={};PWD={}",
            driver, server, database, uid, pwd
        )),
    }
}

/// Engine URL wrapping an ODBC connection string, form-encoded like `quote_plus`
pub fn engine_url(connection_string: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(connection_string.as_bytes()).collect();
    format!("mssql+odbc:///?odbc_connect={}", encoded)
}

/// Replace the `PWD=` value so the string can be logged
pub fn redact_connection_string(connection_string: &str) -> String {
    connection_string
        .split(';')
        .map(|segment| {
            if segment.get(..4).is_some_and(|key| key.eq_ignore_ascii_case("pwd=")) {
                "PWD=***"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

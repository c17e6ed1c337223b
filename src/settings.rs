// Connection Settings
// Options shared by every driver backend, loadable from JSON

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::db::traits::DatabaseError;

fn default_port() -> u16 {
    1433
}

fn default_trust_cert() -> bool {
    true
}

fn default_pool_max_size() -> u32 {
    5
}

fn default_odbc_driver() -> String {
    "SQL Server".to_string()
}

fn default_schema() -> String {
    "dbo".to_string()
}

/// Tunables that are not part of the connection target itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Used when the server string carries no `,port` suffix
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default = "default_trust_cert")]
    pub trust_cert: bool,
    /// Upper bound on engine pool connections
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    /// Value of the `DRIVER={...}` segment
    #[serde(default = "default_odbc_driver")]
    pub odbc_driver: String,
    /// Schema used by `set_table`/`set_view` when none is given
    #[serde(default = "default_schema")]
    pub default_schema: String,
    #[serde(default)]
    pub application_name: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            port: default_port(),
            encrypt: false,
            trust_cert: default_trust_cert(),
            pool_max_size: default_pool_max_size(),
            odbc_driver: default_odbc_driver(),
            default_schema: default_schema(),
            application_name: None,
        }
    }
}

impl ConnectOptions {
    pub fn from_json_str(content: &str) -> Result<Self, DatabaseError> {
        serde_json::from_str(content).map_err(|e| DatabaseError::InvalidConfig(e.to_string()))
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

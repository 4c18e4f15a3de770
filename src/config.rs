//! Configuration for lifesheet

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SheetError;
use crate::identity::{GUEST_COOKIE_MAX_AGE_SECS, GUEST_ID_COOKIE};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lifesheet")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database and this file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Header the auth proxy sets to the signed-in user id
    #[serde(default = "default_auth_header")]
    pub auth_header: String,

    #[serde(default = "default_guest_cookie_name")]
    pub guest_cookie_name: String,

    #[serde(default = "default_guest_cookie_max_age")]
    pub guest_cookie_max_age_secs: u64,
}

fn default_http_port() -> u16 {
    8095
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_auth_header() -> String {
    "x-authenticated-user".to_string()
}

fn default_guest_cookie_name() -> String {
    GUEST_ID_COOKIE.to_string()
}

fn default_guest_cookie_max_age() -> u64 {
    GUEST_COOKIE_MAX_AGE_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            bind_address: default_bind_address(),
            auth_header: default_auth_header(),
            guest_cookie_name: default_guest_cookie_name(),
            guest_cookie_max_age_secs: default_guest_cookie_max_age(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SheetError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SheetError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SheetError> {
        let content = toml::to_string_pretty(self).map_err(|e| SheetError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    /// `bind_address:http_port`
    pub fn listen_addr(&self) -> Result<std::net::SocketAddr, SheetError> {
        format!("{}:{}", self.bind_address, self.http_port)
            .parse()
            .map_err(|e| SheetError::Config(format!("Invalid bind address: {}", e)))
    }
}

//! Configuration loading
//!
//! Reads `db.json` from the target directory, then lets an optional `.env`
//! file and `DB_*` environment variables override the connection settings.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::{env, fs};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, trace, warn};

use crate::codegen::TargetLanguage;
use crate::error::DtoGenError;

/// Configuration file expected in the target directory
pub const CONFIG_FILE: &str = "db.json";
/// Optional environment file in the target directory
pub const ENV_FILE: &str = ".env";

/// Top-level `db.json` document
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub language: String,
    pub connection: ConnectionInfo,
}

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionInfo {
    pub dbms: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub schemas: Vec<String>,
}

/// Supported database systems
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbmsKind {
    PostgreSql,
}

impl FromStr for DbmsKind {
    type Err = DtoGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DbmsKind::PostgreSql),
            _ => Err(DtoGenError::Config(format!("unsupported dbms: {}", s))),
        }
    }
}

impl fmt::Display for DbmsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbmsKind::PostgreSql => write!(f, "PostgreSQL"),
        }
    }
}

impl Config {
    /// Parse a `db.json` document
    pub fn from_json(text: &str) -> Result<Self, DtoGenError> {
        serde_json::from_str(text).map_err(|e| {
            error!(error = ?e, "Invalid configuration file");
            DtoGenError::Config(format!("invalid {}: {}", CONFIG_FILE, e))
        })
    }

    /// Load `db.json` from `dir`, then apply `.env` and environment overrides
    pub fn load(dir: &Path) -> Result<Self, DtoGenError> {
        let path = dir.join(CONFIG_FILE);
        debug!(path = ?path, "Loading configuration");

        let text = fs::read_to_string(&path).map_err(|e| {
            error!(path = ?path, error = ?e, "Failed to read configuration file");
            DtoGenError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_json(&text)?;

        let env_file = dir.join(ENV_FILE);
        if env_file.exists() {
            debug!(path = ?env_file, "Loading environment file");
            dotenvy::from_path(&env_file).map_err(|e| {
                error!(path = ?env_file, error = ?e, "Failed to load environment file");
                DtoGenError::Config(format!("Failed to load {}: {}", env_file.display(), e))
            })?;
        } else {
            trace!(path = ?env_file, "No environment file");
        }

        config.connection.apply_env_overrides()?;

        debug!(
            dbms = ?config.connection.dbms,
            language = ?config.language,
            connection = ?config.connection.redacted_connection_string(),
            schemas = ?config.connection.schemas,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn target_language(&self) -> Result<TargetLanguage, DtoGenError> {
        self.language.parse()
    }
}

impl ConnectionInfo {
    pub fn dbms_kind(&self) -> Result<DbmsKind, DtoGenError> {
        self.dbms.parse()
    }

    /// Override connection fields from `DB_HOST`, `DB_PORT`, `DB_NAME`,
    /// `DB_USER` and `DB_PASSWORD` when set
    pub fn apply_env_overrides(&mut self) -> Result<(), DtoGenError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), DtoGenError> {
        if let Some(host) = lookup("DB_HOST") {
            trace!("DB_HOST overrides host");
            self.host = host;
        }

        if let Some(port) = lookup("DB_PORT") {
            self.port = port.parse::<u16>().map_err(|e| {
                error!(port = ?port, error = ?e, "Invalid DB_PORT value");
                DtoGenError::Config("DB_PORT must be a valid port number".to_string())
            })?;
        }

        if let Some(database) = lookup("DB_NAME") {
            trace!("DB_NAME overrides database");
            self.database = database;
        }

        if let Some(user) = lookup("DB_USER") {
            trace!("DB_USER overrides username");
            self.username = user;
        }

        if let Some(password) = lookup("DB_PASSWORD") {
            trace!("DB_PASSWORD overrides password");
            self.password = password;
        }

        if self.password.is_empty() {
            warn!("Database password is empty");
        }

        Ok(())
    }

    /// Build a PostgreSQL connection string
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host, self.port, self.username, self.password, self.database
        )
    }

    /// Build a connection string with password redacted (for logs and errors)
    pub fn redacted_connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password=*** dbname={}",
            self.host, self.port, self.username, self.database
        )
    }
}

/// Package / module identifier derived from the target directory name
pub fn package_name(dir: &Path) -> Result<String, DtoGenError> {
    let name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            DtoGenError::Config(format!("cannot derive a package name from {}", dir.display()))
        })?;

    let pattern = Regex::new(r"^[a-z0-9]+$")
        .map_err(|e| DtoGenError::Config(format!("invalid package name pattern: {}", e)))?;
    if !pattern.is_match(name) {
        return Err(DtoGenError::Config(format!(
            "directory name must match ^[a-z0-9]+$: {}",
            name
        )));
    }

    Ok(name.to_string())
}

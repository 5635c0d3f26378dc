/// Configuration management for the nodekb service
///
/// Handles server binding, database connection and logging defaults.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Document database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL (default: "sqlite://data/nodekb.db")
    pub url: String,
    /// Connection pool size
    pub max_connections: u32,
}

/// Log filter used when RUST_LOG is not set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// tracing-subscriber filter directive (e.g., "info", "nodekb=debug")
    pub level: String,
}

impl DatabaseConfig {
    /// Filesystem path of the database file, if the URL points at one
    pub fn file_path(&self) -> Option<&str> {
        let path = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        let path = path.split('?').next().unwrap_or(path);
        if path.is_empty() || path == ":memory:" {
            None
        } else {
            Some(path)
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("NODEKB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("NODEKB_PORT")
                    .unwrap_or_else(|_| "3005".to_string())
                    .parse()
                    .unwrap_or(3005),
            },
            database: DatabaseConfig {
                url: std::env::var("NODEKB_DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/nodekb.db".to_string()),
                max_connections: std::env::var("NODEKB_DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            },
            logging: LoggingConfig {
                level: std::env::var("NODEKB_LOG").unwrap_or_else(|_| "info".to_string()),
            },
        }
    }
}

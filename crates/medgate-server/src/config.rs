use std::net::SocketAddr;
use std::time::Duration;

use medgate_auth::AuthConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Signing, token, audit and anomaly configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        // Database validation
        if let Some(url) = self.database.url.as_deref() {
            if url.is_empty() {
                return Err("database.url must not be empty when set".into());
            }
            if self.database.max_connections == 0 {
                return Err("database.max_connections must be > 0".into());
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Auth validation
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.server.request_timeout_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u32,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout_ms() -> u32 {
    15_000
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Relational store settings. Without a `url` the server runs on the
/// in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Create missing tables on start-up.
    #[serde(default)]
    pub ensure_schema: bool,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            ensure_schema: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use std::path::Path;

    use config::{Config, Environment, File};

    use super::AppConfig;

    pub const DEFAULT_CONFIG_FILE: &str = "medgate.toml";
    pub const ENV_PREFIX: &str = "MEDGATE";

    /// Loads the file (if it exists), applies `MEDGATE__SECTION__KEY`
    /// overrides, then validates.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let file = Path::new(path.unwrap_or(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder();
        if file.exists() {
            builder = builder.add_source(File::from(file));
        } else {
            tracing::debug!(path = %file.display(), "Config file not found; using defaults");
        }

        // e.g. MEDGATE__AUTH__SIGNING__SECRET=...
        let env = Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__");

        let merged: AppConfig = builder
            .add_source(env)
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| format!("config error: {e}"))?;

        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        AppConfig {
            auth: AuthConfig::with_secret("unit-test-secret"),
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_config_requires_secret() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.contains("signing.secret"));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut cfg = valid();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));
    }

    #[test]
    fn empty_database_url_rejected() {
        let mut cfg = valid();
        cfg.database.url = Some(String::new());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn addr_falls_back_to_unspecified_host() {
        let mut cfg = valid();
        cfg.server.host = "not-an-ip".into();
        cfg.server.port = 9000;
        assert_eq!(cfg.addr().to_string(), "0.0.0.0:9000");
    }
}

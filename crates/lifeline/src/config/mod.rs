use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::registry::{BloodMatchMode, MatchingConfig, DEFAULT_REDONATION_INTERVAL_DAYS};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the registry service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub matching: MatchingConfig,
    pub access: AccessConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let redonation_interval_days = match env::var("APP_REDONATION_INTERVAL_DAYS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidRedonationInterval { value: raw })?,
            Err(_) => DEFAULT_REDONATION_INTERVAL_DAYS,
        };

        let blood_match_mode = match env::var("APP_BLOOD_MATCH_MODE") {
            Ok(raw) => BloodMatchMode::parse(&raw)
                .ok_or(ConfigError::InvalidBloodMatchMode { value: raw })?,
            Err(_) => BloodMatchMode::default(),
        };

        let admin_ids = env::var("APP_ADMIN_IDS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            matching: MatchingConfig {
                redonation_interval_days,
                blood_match_mode,
            },
            access: AccessConfig { admin_ids },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Accounts seeded as administrators when the in-process directory starts.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub admin_ids: Vec<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidRedonationInterval { value: String },
    InvalidBloodMatchMode { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidRedonationInterval { value } => write!(
                f,
                "APP_REDONATION_INTERVAL_DAYS must be a whole number of days, got '{value}'"
            ),
            ConfigError::InvalidBloodMatchMode { value } => write!(
                f,
                "APP_BLOOD_MATCH_MODE must be 'compatible' or 'exact', got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidRedonationInterval { .. }
            | ConfigError::InvalidBloodMatchMode { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("APP_REDONATION_INTERVAL_DAYS");
        env::remove_var("APP_BLOOD_MATCH_MODE");
        env::remove_var("APP_ADMIN_IDS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.matching, MatchingConfig::default());
        assert!(config.access.admin_ids.is_empty());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_matching_and_admin_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_REDONATION_INTERVAL_DAYS", "90");
        env::set_var("APP_BLOOD_MATCH_MODE", "exact");
        env::set_var("APP_ADMIN_IDS", "alice, bob,,");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.matching.redonation_interval_days, 90);
        assert_eq!(config.matching.blood_match_mode, BloodMatchMode::Exact);
        assert_eq!(
            config.access.admin_ids,
            vec!["alice".to_string(), "bob".to_string()]
        );
        reset_env();
    }

    #[test]
    fn blank_admin_list_grants_no_admins() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ADMIN_IDS", " , ");
        let config = AppConfig::load().expect("config loads");
        assert!(config.access.admin_ids.is_empty());
        reset_env();
    }

    #[test]
    fn rejects_unknown_blood_match_mode() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_BLOOD_MATCH_MODE", "closest");
        let error = AppConfig::load().expect_err("mode is validated");
        assert!(matches!(error, ConfigError::InvalidBloodMatchMode { .. }));
        reset_env();
    }
}

use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::enrollment::receipts::DEFAULT_RECEIPT_MAX_BYTES;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub enrollment: EnrollmentConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            enrollment: EnrollmentConfig::from_env()?,
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

/// Enrollment workflow knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentConfig {
    /// Approved requests older than this many days are left for manual review.
    pub lookback_days: u32,
    pub receipt_max_bytes: u64,
    /// Local directory for receipts; in-memory storage when unset.
    pub receipt_dir: Option<PathBuf>,
    /// Curriculum CSV export loaded at startup.
    pub curriculum_csv: Option<PathBuf>,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            receipt_max_bytes: DEFAULT_RECEIPT_MAX_BYTES,
            receipt_dir: None,
            curriculum_csv: None,
        }
    }
}

impl EnrollmentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let lookback_days = match non_empty_var("ENROLLMENT_LOOKBACK_DAYS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|days| *days > 0)
                .ok_or(ConfigError::InvalidLookback)?,
            None => defaults.lookback_days,
        };
        let receipt_max_bytes = match non_empty_var("RECEIPT_MAX_BYTES") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|bytes| *bytes > 0)
                .ok_or(ConfigError::InvalidReceiptLimit)?,
            None => defaults.receipt_max_bytes,
        };

        Ok(Self {
            lookback_days,
            receipt_max_bytes,
            receipt_dir: non_empty_var("RECEIPT_DIR").map(PathBuf::from),
            curriculum_csv: non_empty_var("CURRICULUM_CSV").map(PathBuf::from),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLookback,
    InvalidReceiptLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLookback => {
                write!(f, "ENROLLMENT_LOOKBACK_DAYS must be a positive whole number")
            }
            ConfigError::InvalidReceiptLimit => {
                write!(f, "RECEIPT_MAX_BYTES must be a positive byte count")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidLookback
            | ConfigError::InvalidReceiptLimit => None,
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
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "ENROLLMENT_LOOKBACK_DAYS",
            "RECEIPT_MAX_BYTES",
            "RECEIPT_DIR",
            "CURRICULUM_CSV",
        ] {
            env::remove_var(key);
        }
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
        assert_eq!(config.enrollment, EnrollmentConfig::default());
        assert_eq!(config.enrollment.receipt_max_bytes, 5 * 1024 * 1024);
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
    fn reads_enrollment_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ENROLLMENT_LOOKBACK_DAYS", "45");
        env::set_var("RECEIPT_MAX_BYTES", "1024");
        env::set_var("RECEIPT_DIR", "/var/lib/registry/receipts");
        env::set_var("CURRICULUM_CSV", " ");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.enrollment.lookback_days, 45);
        assert_eq!(config.enrollment.receipt_max_bytes, 1024);
        assert_eq!(
            config.enrollment.receipt_dir,
            Some(PathBuf::from("/var/lib/registry/receipts"))
        );
        assert_eq!(config.enrollment.curriculum_csv, None);
        reset_env();
    }

    #[test]
    fn rejects_zero_lookback() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ENROLLMENT_LOOKBACK_DAYS", "0");
        let err = AppConfig::load().expect_err("zero lookback is invalid");
        assert!(matches!(err, ConfigError::InvalidLookback));
        reset_env();
    }
}

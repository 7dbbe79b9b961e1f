use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

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
    pub ledger: LedgerConfig,
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

        let ledger = LedgerConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            ledger,
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Retry and fan-out limits for ledger writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Aggregate write attempts per operation, counting the first one.
    pub max_write_attempts: u32,
    /// Student groups reversed concurrently by a batch delete.
    pub batch_parallelism: usize,
}

impl LedgerConfig {
    pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;
    pub const DEFAULT_BATCH_PARALLELISM: usize = 4;

    fn from_env() -> Result<Self, ConfigError> {
        let max_write_attempts = match env::var("LEDGER_MAX_WRITE_ATTEMPTS") {
            Ok(value) => value
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts >= 1)
                .ok_or(ConfigError::InvalidAttempts(value))?,
            Err(_) => Self::DEFAULT_MAX_WRITE_ATTEMPTS,
        };

        let batch_parallelism = match env::var("LEDGER_BATCH_PARALLELISM") {
            Ok(value) => value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|parallelism| *parallelism >= 1)
                .ok_or(ConfigError::InvalidParallelism(value))?,
            Err(_) => Self::DEFAULT_BATCH_PARALLELISM,
        };

        Ok(Self {
            max_write_attempts,
            batch_parallelism,
        })
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: Self::DEFAULT_MAX_WRITE_ATTEMPTS,
            batch_parallelism: Self::DEFAULT_BATCH_PARALLELISM,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidAttempts(String),
    InvalidParallelism(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidAttempts(value) => write!(
                f,
                "LEDGER_MAX_WRITE_ATTEMPTS must be a positive integer, got '{}'",
                value
            ),
            ConfigError::InvalidParallelism(value) => write!(
                f,
                "LEDGER_BATCH_PARALLELISM must be a positive integer, got '{}'",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidAttempts(_)
            | ConfigError::InvalidParallelism(_) => None,
        }
    }
}

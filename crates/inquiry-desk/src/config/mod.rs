use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chrono::Duration;

use crate::workflows::inquiries::DeskConfig;

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
    pub desk: DeskConfig,
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
            desk: load_desk_config()?,
        })
    }
}

/// Engine knobs, each falling back to the engine default when unset.
fn load_desk_config() -> Result<DeskConfig, ConfigError> {
    let mut desk = DeskConfig::default();

    let duplicates = &mut desk.duplicates;
    if let Some(hours) = env_number::<i64>("DESK_EXACT_WINDOW_HOURS")? {
        duplicates.exact_window = Duration::hours(hours);
        duplicates.similar_window = Duration::hours(hours);
    }
    if let Some(minutes) = env_number::<i64>("DESK_FREQUENCY_WINDOW_MINUTES")? {
        duplicates.ip_window = Duration::minutes(minutes);
        duplicates.client_window = Duration::minutes(minutes);
        duplicates.property_window = Duration::minutes(minutes);
    }
    if let Some(threshold) = env_number("DESK_IP_THRESHOLD")? {
        duplicates.ip_threshold = threshold;
    }
    if let Some(threshold) = env_number("DESK_CLIENT_THRESHOLD")? {
        duplicates.client_threshold = threshold;
    }
    if let Some(threshold) = env_number("DESK_PROPERTY_THRESHOLD")? {
        duplicates.property_threshold = threshold;
    }
    if let Some(threshold) = env_number::<f64>("DESK_SIMILARITY_THRESHOLD")? {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidNumber {
                key: "DESK_SIMILARITY_THRESHOLD",
            });
        }
        duplicates.similarity_threshold = threshold;
    }

    let weights = &mut desk.fit.weights;
    for (key, slot) in [
        ("DESK_WEIGHT_WORKLOAD", &mut weights.workload),
        ("DESK_WEIGHT_PERFORMANCE", &mut weights.performance),
        ("DESK_WEIGHT_LOCATION", &mut weights.location),
        ("DESK_WEIGHT_STALENESS", &mut weights.staleness),
    ] {
        if let Some(weight) = env_number::<f64>(key)? {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidNumber { key });
            }
            *slot = weight;
        }
    }

    Ok(desk)
}

fn env_number<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key }),
        _ => Ok(None),
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

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { source } => {
                write!(f, "APP_HOST must be an IP address or localhost: {source}")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a valid non-negative number")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

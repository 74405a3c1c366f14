use crate::workflows::premises::{PipelineConfig, RetryPolicy};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

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
    pub pipeline: PipelineConfig,
    pub services: ServiceConfig,
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
            pipeline: load_pipeline()?,
            services: load_services()?,
        })
    }
}

fn load_pipeline() -> Result<PipelineConfig, ConfigError> {
    let proximity_radius_km: f64 = parse_var("PREMISES_PROXIMITY_RADIUS_KM", 0.1)?;
    if !(proximity_radius_km.is_finite() && proximity_radius_km > 0.0) {
        return Err(ConfigError::OutOfRange {
            key: "PREMISES_PROXIMITY_RADIUS_KM",
            detail: "must be a positive number of kilometers",
        });
    }

    let max_neighbors: usize = parse_var("PREMISES_MAX_NEIGHBORS", 10)?;
    if max_neighbors == 0 {
        return Err(ConfigError::OutOfRange {
            key: "PREMISES_MAX_NEIGHBORS",
            detail: "must be at least 1",
        });
    }

    let duplicate_threshold = parse_unit_interval("PREMISES_DUPLICATE_THRESHOLD", 0.8)?;
    let min_address_confidence = parse_unit_interval("PREMISES_MIN_ADDRESS_CONFIDENCE", 0.5)?;

    let call_timeout_ms: u64 = parse_var("PREMISES_CALL_TIMEOUT_MS", 10_000)?;
    if call_timeout_ms == 0 {
        return Err(ConfigError::OutOfRange {
            key: "PREMISES_CALL_TIMEOUT_MS",
            detail: "must be greater than zero",
        });
    }

    let max_retries: u32 = parse_var("PREMISES_MAX_RETRIES", 3)?;
    let base_backoff_ms: u64 = parse_var("PREMISES_RETRY_BACKOFF_MS", 250)?;
    let max_backoff_ms: u64 = parse_var("PREMISES_RETRY_MAX_BACKOFF_MS", 5_000)?;

    let workers: usize = parse_var("PREMISES_WORKERS", 4)?;
    if workers == 0 {
        return Err(ConfigError::OutOfRange {
            key: "PREMISES_WORKERS",
            detail: "must be at least 1",
        });
    }

    let verify_output: bool = parse_var("PREMISES_VERIFY_OUTPUT", true)?;

    Ok(PipelineConfig {
        proximity_radius_km,
        max_neighbors,
        duplicate_threshold,
        min_address_confidence,
        retry: RetryPolicy {
            call_timeout: Duration::from_millis(call_timeout_ms),
            max_retries,
            base_backoff: Duration::from_millis(base_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(base_backoff_ms)),
        },
        workers,
        verify_output,
    })
}

fn load_services() -> Result<ServiceConfig, ConfigError> {
    let mode = match env::var("PREMISES_SERVICE_MODE") {
        Ok(value) => ServiceMode::parse(&value).ok_or(ConfigError::InvalidValue {
            key: "PREMISES_SERVICE_MODE",
            value,
        })?,
        Err(_) => ServiceMode::Offline,
    };

    let store_path = path_var("PREMISES_STORE_PATH", "data/premises.csv");
    let gazetteer_path = path_var("PREMISES_GAZETTEER_PATH", "data/gazetteer.csv");
    let taxonomy_path = path_var("PREMISES_TAXONOMY_PATH", "data/occupancy_types.csv");

    let remote = match mode {
        ServiceMode::Offline => None,
        ServiceMode::Remote => {
            let geocoding_api_key = env::var("GEOCODING_API_KEY")
                .map_err(|_| ConfigError::MissingVar("GEOCODING_API_KEY"))?;
            let llm_api_key = env::var("LLM_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .map_err(|_| ConfigError::MissingVar("LLM_API_KEY"))?;

            Some(RemoteServiceConfig {
                geocoding_api_key,
                geocoding_base_url: env::var("GEOCODING_BASE_URL")
                    .unwrap_or_else(|_| "https://maps.googleapis.com".to_string()),
                llm_api_key,
                llm_base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                scoring_model: env::var("LLM_SCORING_MODEL")
                    .unwrap_or_else(|_| "gpt-4o".to_string()),
                classification_model: env::var("LLM_CLASSIFICATION_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            })
        }
    };

    Ok(ServiceConfig {
        mode,
        store_path,
        gazetteer_path,
        taxonomy_path,
        remote,
    })
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

fn parse_unit_interval(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    let value: f64 = parse_var(key, default)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::OutOfRange {
            key,
            detail: "must be between 0.0 and 1.0",
        })
    }
}

fn path_var(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env::var(key).unwrap_or_else(|_| default.to_string()))
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

/// Which family of collaborator adapters backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// Reference files on disk: gazetteer, lexical scorer, keyword taxonomy.
    Offline,
    /// Geocoding API plus chat-completions scoring and classification.
    Remote,
}

impl ServiceMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "offline" | "local" => Some(Self::Offline),
            "remote" | "api" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// Locations of reference data plus credentials for the remote adapters.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub mode: ServiceMode,
    pub store_path: PathBuf,
    pub gazetteer_path: PathBuf,
    pub taxonomy_path: PathBuf,
    pub remote: Option<RemoteServiceConfig>,
}

#[derive(Clone)]
pub struct RemoteServiceConfig {
    pub geocoding_api_key: String,
    pub geocoding_base_url: String,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub scoring_model: String,
    pub classification_model: String,
}

impl fmt::Debug for RemoteServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteServiceConfig")
            .field("geocoding_base_url", &self.geocoding_base_url)
            .field("llm_base_url", &self.llm_base_url)
            .field("scoring_model", &self.scoring_model)
            .field("classification_model", &self.classification_model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    OutOfRange { key: &'static str, detail: &'static str },
    MissingVar(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an unparseable value '{value}'")
            }
            ConfigError::OutOfRange { key, detail } => write!(f, "{key} {detail}"),
            ConfigError::MissingVar(key) => {
                write!(f, "{key} must be set when PREMISES_SERVICE_MODE=remote")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
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
            "PREMISES_PROXIMITY_RADIUS_KM",
            "PREMISES_MAX_NEIGHBORS",
            "PREMISES_DUPLICATE_THRESHOLD",
            "PREMISES_MIN_ADDRESS_CONFIDENCE",
            "PREMISES_CALL_TIMEOUT_MS",
            "PREMISES_MAX_RETRIES",
            "PREMISES_RETRY_BACKOFF_MS",
            "PREMISES_RETRY_MAX_BACKOFF_MS",
            "PREMISES_WORKERS",
            "PREMISES_VERIFY_OUTPUT",
            "PREMISES_SERVICE_MODE",
            "PREMISES_STORE_PATH",
            "GEOCODING_API_KEY",
            "LLM_API_KEY",
            "OPENAI_API_KEY",
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
        assert_eq!(config.pipeline.max_neighbors, 10);
        assert!((config.pipeline.duplicate_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.pipeline.retry.max_retries, 3);
        assert_eq!(config.pipeline.retry.call_timeout, Duration::from_secs(10));
        assert_eq!(config.services.mode, ServiceMode::Offline);
        assert!(config.services.remote.is_none());
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
    fn rejects_threshold_outside_unit_interval() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PREMISES_DUPLICATE_THRESHOLD", "1.5");
        match AppConfig::load() {
            Err(ConfigError::OutOfRange { key, .. }) => {
                assert_eq!(key, "PREMISES_DUPLICATE_THRESHOLD")
            }
            other => panic!("expected out of range error, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn rejects_unparseable_numbers() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PREMISES_MAX_NEIGHBORS", "many");
        match AppConfig::load() {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "PREMISES_MAX_NEIGHBORS");
                assert_eq!(value, "many");
            }
            other => panic!("expected invalid value error, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn remote_mode_requires_credentials() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PREMISES_SERVICE_MODE", "remote");
        match AppConfig::load() {
            Err(ConfigError::MissingVar(key)) => assert_eq!(key, "GEOCODING_API_KEY"),
            other => panic!("expected missing var error, got {other:?}"),
        }

        env::set_var("GEOCODING_API_KEY", "geo-key");
        env::set_var("OPENAI_API_KEY", "llm-key");
        let config = AppConfig::load().expect("remote config loads");
        let remote = config.services.remote.expect("remote settings present");
        assert_eq!(remote.llm_api_key, "llm-key");
        assert!(!format!("{remote:?}").contains("geo-key"));
        reset_env();
    }
}

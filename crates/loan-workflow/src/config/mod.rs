use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::Duration;

use crate::workflows::pinjaman::{LockPolicy, ResubmissionPolicy};

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
    pub workflow: WorkflowConfig,
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
            workflow: WorkflowConfig::from_env()?,
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

/// Engine tunables: note length, resubmission policy, lock expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub min_note_chars: usize,
    pub resubmission: ResubmissionPolicy,
    pub lock_ttl: Option<Duration>,
    pub event_buffer: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            min_note_chars: 10,
            resubmission: ResubmissionPolicy::IntakeOwnerOnly,
            lock_ttl: None,
            event_buffer: 256,
        }
    }
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let min_note_chars = match env::var("WORKFLOW_MIN_NOTE_CHARS") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNoteLength(raw))?,
            Err(_) => defaults.min_note_chars,
        };

        let resubmission = match env::var("WORKFLOW_RESUBMIT_POLICY") {
            Ok(raw) => ResubmissionPolicy::parse(&raw)
                .ok_or(ConfigError::InvalidResubmitPolicy(raw))?,
            Err(_) => defaults.resubmission,
        };

        let lock_ttl = match env::var("WORKFLOW_LOCK_TTL_SECS") {
            Ok(raw) => match raw.trim().parse::<i64>() {
                Ok(0) => None,
                Ok(secs) if secs > 0 => Some(Duration::seconds(secs)),
                _ => return Err(ConfigError::InvalidLockTtl(raw)),
            },
            Err(_) => defaults.lock_ttl,
        };

        let event_buffer = match env::var("WORKFLOW_EVENT_BUFFER") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidEventBuffer(raw)),
            },
            Err(_) => defaults.event_buffer,
        };

        Ok(Self {
            min_note_chars,
            resubmission,
            lock_ttl,
            event_buffer,
        })
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy { ttl: self.lock_ttl }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNoteLength(String),
    InvalidResubmitPolicy(String),
    InvalidLockTtl(String),
    InvalidEventBuffer(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNoteLength(raw) => write!(
                f,
                "WORKFLOW_MIN_NOTE_CHARS must be a non-negative integer (got '{raw}')"
            ),
            ConfigError::InvalidResubmitPolicy(raw) => write!(
                f,
                "WORKFLOW_RESUBMIT_POLICY must be 'intake_owner' or 'any_intake' (got '{raw}')"
            ),
            ConfigError::InvalidLockTtl(raw) => write!(
                f,
                "WORKFLOW_LOCK_TTL_SECS must be a non-negative number of seconds (got '{raw}')"
            ),
            ConfigError::InvalidEventBuffer(raw) => write!(
                f,
                "WORKFLOW_EVENT_BUFFER must be a positive integer (got '{raw}')"
            ),
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

//! Runtime configuration loaded from environment variables.

use std::env;

/// Default development values - NEVER use in production.
pub mod defaults {
    pub const DEV_DATABASE_URL: &str = "sqlite::memory:";
    pub const DEV_MAX_OPEN_CONNECTIONS: u32 = 4;
    pub const DEV_MAX_IDLE_CONNECTIONS: u32 = 4;
    pub const DEV_CONN_MAX_LIFETIME_SECS: u64 = 3600;
    pub const DEV_CONN_MAX_IDLE_TIME_SECS: u64 = 3600;
    /// Value cache budget, bytes (§4.1).
    pub const VALUE_CACHE_BYTES: usize = 1024 * 1024;
    /// Archive channel capacity (§4.2/§5).
    pub const ARCHIVE_CHANNEL_CAPACITY: usize = 128;
    /// Threshold under which a job counts as "short running" for stats (§4.4).
    pub const SHORT_RUNNING_JOBS_DURATION_SECS: i64 = 5 * 60;
    /// Per-user UI config cache TTL, hours (§4.7).
    pub const UI_CONFIG_CACHE_TTL_HOURS: u64 = 24;
}

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Parse environment from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Job repository core configuration.
///
/// Names follow the teacher's `RRV_*` environment-variable convention, rebased onto
/// `JOBREPO_*` for this crate.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    /// Connection string consumed by `sea_orm::Database::connect`.
    pub database_url: String,
    /// Max open connections in the pool (default 4, per spec §4.1).
    pub max_open_connections: u32,
    /// Max idle connections in the pool (default 4, per spec §4.1).
    pub max_idle_connections: u32,
    /// Connection max lifetime, seconds (default 1h, per spec §4.1).
    pub conn_max_lifetime_secs: u64,
    /// Connection max idle time, seconds (default 1h, per spec §4.1).
    pub conn_max_idle_time_secs: u64,
    /// LRU value-cache byte budget (default 1 MiB, per spec §4.1).
    pub value_cache_bytes: usize,
    /// Archive channel capacity (default 128, per spec §4.2/§5).
    pub archive_channel_capacity: usize,
    /// Duration threshold under which a job is "short running" (§4.4).
    pub short_running_jobs_duration_secs: i64,
    /// UI config per-user cache TTL, hours (§4.7).
    pub ui_config_cache_ttl_hours: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In development mode (`JOBREPO_ENV=development`) every variable has a sensible
    /// default and only `JOBREPO_ENV` is required. In production mode
    /// `JOBREPO_DATABASE_URL` is required and must not match the development default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_str =
            env::var("JOBREPO_ENV").map_err(|_| ConfigError::MissingEnvVar("JOBREPO_ENV"))?;

        let environment = Environment::from_str(&env_str).ok_or(ConfigError::InvalidValue(
            "JOBREPO_ENV must be 'development' or 'production'",
        ))?;

        let database_url = env::var("JOBREPO_DATABASE_URL")
            .unwrap_or_else(|_| defaults::DEV_DATABASE_URL.to_string());

        let max_open_connections = parse_or_default(
            "JOBREPO_MAX_OPEN_CONNECTIONS",
            defaults::DEV_MAX_OPEN_CONNECTIONS,
        )?;
        let max_idle_connections = parse_or_default(
            "JOBREPO_MAX_IDLE_CONNECTIONS",
            defaults::DEV_MAX_IDLE_CONNECTIONS,
        )?;
        let conn_max_lifetime_secs = parse_or_default(
            "JOBREPO_CONN_MAX_LIFETIME_SECS",
            defaults::DEV_CONN_MAX_LIFETIME_SECS,
        )?;
        let conn_max_idle_time_secs = parse_or_default(
            "JOBREPO_CONN_MAX_IDLE_TIME_SECS",
            defaults::DEV_CONN_MAX_IDLE_TIME_SECS,
        )?;
        let value_cache_bytes =
            parse_or_default("JOBREPO_VALUE_CACHE_BYTES", defaults::VALUE_CACHE_BYTES)?;
        let archive_channel_capacity = parse_or_default(
            "JOBREPO_ARCHIVE_CHANNEL_CAPACITY",
            defaults::ARCHIVE_CHANNEL_CAPACITY,
        )?;
        let short_running_jobs_duration_secs = parse_or_default(
            "JOBREPO_SHORT_RUNNING_JOBS_DURATION_SECS",
            defaults::SHORT_RUNNING_JOBS_DURATION_SECS,
        )?;
        let ui_config_cache_ttl_hours = parse_or_default(
            "JOBREPO_UI_CONFIG_CACHE_TTL_HOURS",
            defaults::UI_CONFIG_CACHE_TTL_HOURS,
        )?;

        let config = Config {
            environment,
            database_url,
            max_open_connections,
            max_idle_connections,
            conn_max_lifetime_secs,
            conn_max_idle_time_secs,
            value_cache_bytes,
            archive_channel_capacity,
            short_running_jobs_duration_secs,
            ui_config_cache_ttl_hours,
        };

        if environment.is_production() {
            config.validate_production()?;
        }

        Ok(config)
    }

    /// Validate that production configuration does not use development defaults.
    fn validate_production(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.database_url == defaults::DEV_DATABASE_URL {
            errors.push(format!(
                "JOBREPO_DATABASE_URL is using development default '{}'. Set a production database URL.",
                defaults::DEV_DATABASE_URL
            ));
        }

        if !errors.is_empty() {
            return Err(ConfigError::ProductionValidation(errors));
        }

        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment.is_development()
    }
}

fn parse_or_default<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + ToString,
{
    match env::var(var) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(var)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(&'static str),

    #[error("Production configuration validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    ProductionValidation(Vec<String>),
}

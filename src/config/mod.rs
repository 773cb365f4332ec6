//! Configuration management for FraudWatch
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::fraud::RiskWeights;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

/// Fraud scoring settings
#[derive(Debug, Clone, PartialEq)]
pub struct RiskSettings {
    pub weights: RiskWeights,

    /// Composite score at or above which an alert is persisted
    pub flag_threshold: u8,

    /// Composite score at or above which the actor is suspended
    pub suspend_threshold: u8,

    pub velocity_window_seconds: u64,

    /// Requests per window tolerated before the velocity score rises
    pub velocity_limit: i64,

    pub duplicate_ttl_seconds: u64,

    pub fingerprint_ttl_seconds: u64,

    /// Distinct IPs per fingerprint that trigger the multi-IP signal
    pub fingerprint_max_ips: usize,

    /// Addresses seeded into the blacklist set at startup
    pub ip_blacklist: Vec<String>,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            flag_threshold: 20,
            suspend_threshold: 70,
            velocity_window_seconds: 60,
            velocity_limit: 20,
            duplicate_ttl_seconds: 300,
            fingerprint_ttl_seconds: 24 * 60 * 60,
            fingerprint_max_ips: 3,
            ip_blacklist: Vec::new(),
        }
    }
}

/// Dispute lifecycle settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisputeSettings {
    /// Days an OPEN dispute waits for respondent evidence before auto-resolving
    pub auto_resolve_days: i64,

    /// Interval between auto-resolve sweeps
    pub sweep_interval_seconds: u64,
}

impl Default for DisputeSettings {
    fn default() -> Self {
        Self {
            auto_resolve_days: 3,
            sweep_interval_seconds: 3600,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; in-memory repositories are used when absent
    pub database_url: Option<String>,

    /// Current environment
    pub environment: Environment,

    /// Health endpoint port
    pub port: u16,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Log level (RUST_LOG)
    pub log_level: String,

    pub risk: RiskSettings,

    pub dispute: DisputeSettings,

    /// Interval between expired-key purges of the in-memory signal store
    pub signal_store_purge_interval_seconds: u64,
}

/// Read `name`, falling back to `default` when unset. Unparseable values are an error.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(format!("{} has an invalid value: '{}'", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated list, dropping blanks
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if database_url.is_none() && environment.is_production() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort("PORT must be a valid number".to_string()))?;

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .unwrap_or(5);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let defaults = RiskSettings::default();
        let risk = RiskSettings {
            weights: RiskWeights {
                velocity: env_or("RISK_WEIGHT_VELOCITY", defaults.weights.velocity)?,
                duplicate: env_or("RISK_WEIGHT_DUPLICATE", defaults.weights.duplicate)?,
                reputation: env_or("RISK_WEIGHT_REPUTATION", defaults.weights.reputation)?,
            },
            flag_threshold: env_or("RISK_FLAG_THRESHOLD", defaults.flag_threshold)?,
            suspend_threshold: env_or("RISK_SUSPEND_THRESHOLD", defaults.suspend_threshold)?,
            velocity_window_seconds: env_or(
                "VELOCITY_WINDOW_SECONDS",
                defaults.velocity_window_seconds,
            )?,
            velocity_limit: env_or("VELOCITY_LIMIT", defaults.velocity_limit)?,
            duplicate_ttl_seconds: env_or("DUPLICATE_TTL_SECONDS", defaults.duplicate_ttl_seconds)?,
            fingerprint_ttl_seconds: env_or(
                "FINGERPRINT_TTL_SECONDS",
                defaults.fingerprint_ttl_seconds,
            )?,
            fingerprint_max_ips: env_or("FINGERPRINT_MAX_IPS", defaults.fingerprint_max_ips)?,
            ip_blacklist: env::var("IP_BLACKLIST")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
        };

        let dispute_defaults = DisputeSettings::default();
        let dispute = DisputeSettings {
            auto_resolve_days: env_or(
                "DISPUTE_AUTO_RESOLVE_DAYS",
                dispute_defaults.auto_resolve_days,
            )?,
            sweep_interval_seconds: env_or(
                "DISPUTE_SWEEP_INTERVAL_SECONDS",
                dispute_defaults.sweep_interval_seconds,
            )?,
        };

        let signal_store_purge_interval_seconds =
            env_or("SIGNAL_STORE_PURGE_INTERVAL_SECONDS", 60u64)?;

        let config = Config {
            database_url,
            environment,
            port,
            db_max_connections,
            log_level,
            risk,
            dispute,
            signal_store_purge_interval_seconds,
        };
        config.validate()?;

        Ok(config)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;

        risk.weights.validate().map_err(ConfigError::InvalidValue)?;

        if risk.flag_threshold > 100 || risk.suspend_threshold > 100 {
            return Err(ConfigError::InvalidValue(
                "Risk thresholds must be within 0..=100".to_string(),
            ));
        }
        if risk.flag_threshold > risk.suspend_threshold {
            return Err(ConfigError::InvalidValue(format!(
                "RISK_FLAG_THRESHOLD ({}) must not exceed RISK_SUSPEND_THRESHOLD ({})",
                risk.flag_threshold, risk.suspend_threshold
            )));
        }

        let ttls = [
            ("VELOCITY_WINDOW_SECONDS", risk.velocity_window_seconds),
            ("DUPLICATE_TTL_SECONDS", risk.duplicate_ttl_seconds),
            ("FINGERPRINT_TTL_SECONDS", risk.fingerprint_ttl_seconds),
            ("DISPUTE_SWEEP_INTERVAL_SECONDS", self.dispute.sweep_interval_seconds),
            (
                "SIGNAL_STORE_PURGE_INTERVAL_SECONDS",
                self.signal_store_purge_interval_seconds,
            ),
        ];
        for (name, value) in ttls {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if risk.fingerprint_max_ips == 0 {
            return Err(ConfigError::InvalidValue(
                "FINGERPRINT_MAX_IPS must be greater than 0".to_string(),
            ));
        }
        if self.dispute.auto_resolve_days < 0 {
            return Err(ConfigError::InvalidValue(
                "DISPUTE_AUTO_RESOLVE_DAYS must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> Option<String> {
        let url = self.database_url.as_ref()?;

        // Mask password in database URL for logging
        if let Some(at_pos) = url.find('@') {
            if let Some(colon_pos) = url[..at_pos].rfind(':') {
                let prefix = &url[..colon_pos + 1];
                let suffix = &url[at_pos..];
                return Some(format!("{}****{}", prefix, suffix));
            }
        }
        Some(url.clone())
    }
}

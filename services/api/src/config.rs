//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::Duration;
use reading_engine_core::{SessionOptions, TrackerConfig};
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub allowed_origin: String,
    /// How often an active reading-time segment is checkpointed.
    pub flush_interval_secs: u64,
    /// Quiet period before a page turn is written out.
    pub position_debounce_ms: u64,
    pub min_segment_secs: u64,
    /// Leading share of a book's text served for preview access.
    pub preview_fraction: f64,
    pub demo_fallback: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin =
            lookup("ALLOWED_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        // --- Reading Engine Settings ---
        let flush_interval_secs = parse_or(&lookup, "FLUSH_INTERVAL_SECS", 30u64)?;
        if flush_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "FLUSH_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let position_debounce_ms = parse_or(&lookup, "POSITION_DEBOUNCE_MS", 2_000u64)?;
        let min_segment_secs = parse_or(&lookup, "MIN_SEGMENT_SECS", 5u64)?;

        let preview_fraction = parse_or(&lookup, "PREVIEW_FRACTION", 0.1f64)?;
        if !(0.0..=1.0).contains(&preview_fraction) {
            return Err(ConfigError::InvalidValue(
                "PREVIEW_FRACTION".to_string(),
                format!("{} is not between 0 and 1", preview_fraction),
            ));
        }

        let demo_fallback = parse_or(&lookup, "DEMO_FALLBACK", false)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            allowed_origin,
            flush_interval_secs,
            position_debounce_ms,
            min_segment_secs,
            preview_fraction,
            demo_fallback,
        })
    }

    /// Session defaults derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            demo_fallback: self.demo_fallback,
            position_debounce: Duration::milliseconds(self.position_debounce_ms as i64),
            tracker: TrackerConfig {
                min_segment: Duration::seconds(self.min_segment_secs as i64),
                flush_interval: Duration::seconds(self.flush_interval_secs as i64),
            },
            ..SessionOptions::default()
        }
    }

    /// How often pending position writes are checked. Never slower than once a second.
    pub fn position_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.position_debounce_ms.clamp(250, 1_000))
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

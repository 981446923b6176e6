//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::consensus::tally::DEFAULT_APPROVAL_THRESHOLD;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load environment variables: {0}")]
    EnvLoad(#[from] dotenvy::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Consensus engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    /// Fraction of a track's votes that must approve, in (0, 1]
    pub approval_threshold: f64,
    /// Where the audit trail is appended; `None` keeps it in memory
    pub audit_log_path: Option<PathBuf>,
    /// Outcome of the external zeroth-gate check
    pub zeroth_gate_open: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
            audit_log_path: Some(PathBuf::from("data/audit/consensus.jsonl")),
            zeroth_gate_open: true,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub consensus: ConsensusConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is fine; a malformed one is not
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (the process env in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            host: match lookup("HOST") {
                Some(h) => h
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(format!("HOST is not an IPv4 address: {}", h)))?,
                None => ServerConfig::default().host,
            },
            port: match lookup("PORT") {
                Some(p) => p
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(format!("PORT is not a valid port: {}", p)))?,
                None => ServerConfig::default().port,
            },
        };

        let cors = CorsConfig {
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let defaults = ConsensusConfig::default();
        let approval_threshold = match lookup("CONSENSUS_APPROVAL_THRESHOLD") {
            Some(raw) => Self::parse_threshold(&raw)?,
            None => defaults.approval_threshold,
        };

        let audit_log_path = match lookup("AUDIT_LOG_PATH") {
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(PathBuf::from(path.trim())),
            None => defaults.audit_log_path,
        };

        let zeroth_gate_open = match lookup("ZEROTH_GATE_OPEN") {
            Some(raw) => Self::parse_flag("ZEROTH_GATE_OPEN", &raw)?,
            None => defaults.zeroth_gate_open,
        };

        Ok(Self {
            server,
            cors,
            consensus: ConsensusConfig {
                approval_threshold,
                audit_log_path,
                zeroth_gate_open,
            },
        })
    }

    fn parse_threshold(raw: &str) -> Result<f64, ConfigError> {
        let value: f64 = raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(format!("CONSENSUS_APPROVAL_THRESHOLD is not a number: {}", raw))
        })?;

        if !(value > 0.0 && value <= 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "CONSENSUS_APPROVAL_THRESHOLD must be in (0, 1], got {}",
                value
            )));
        }
        Ok(value)
    }

    fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue(format!("{} is not a boolean: {}", key, other))),
        }
    }
}

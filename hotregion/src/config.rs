//! Scheduler configuration

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Perspective from which hot regions are balanced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceType {
    /// Balance by write flow (leader and peer views)
    Write,
    /// Balance by read flow (leader view)
    Read,
}

impl BalanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceType::Write => "write",
            BalanceType::Read => "read",
        }
    }
}

/// Main scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Balance types picked from uniformly at random on every cycle
    #[serde(default = "default_balance_types")]
    pub balance_types: Vec<BalanceType>,

    /// Attempts per write-balance cycle, each picking peer or leader planning
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: usize,

    /// Emit leader transfers for read-hot regions
    #[serde(default)]
    pub enable_read_leader_balance: bool,

    /// Damping applied to the surplus when recomputing the balance limit
    #[serde(default = "default_limit_factor")]
    pub limit_factor: f64,

    /// Share of the source flow a destination may reach after a move
    #[serde(default = "default_schedule_factor")]
    pub schedule_factor: f64,

    /// Seed for the scheduler's random source (entropy when unset)
    #[serde(default)]
    pub seed: Option<u64>,

    /// External scorer side channel
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_balance_types() -> Vec<BalanceType> {
    vec![BalanceType::Write, BalanceType::Read]
}

fn default_max_write_attempts() -> usize {
    10
}

fn default_limit_factor() -> f64 {
    0.75
}

fn default_schedule_factor() -> f64 {
    0.9
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            balance_types: default_balance_types(),
            max_write_attempts: default_max_write_attempts(),
            enable_read_leader_balance: false,
            limit_factor: default_limit_factor(),
            schedule_factor: default_schedule_factor(),
            seed: None,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the dispatcher cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.balance_types.is_empty() {
            return Err(SchedulerError::Config(
                "balance_types must not be empty".to_string(),
            ));
        }
        if self.max_write_attempts == 0 {
            return Err(SchedulerError::Config(
                "max_write_attempts must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("limit_factor", self.limit_factor),
            ("schedule_factor", self.schedule_factor),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(SchedulerError::Config(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.telemetry.enabled && self.telemetry.queue_capacity == 0 {
            return Err(SchedulerError::Config(
                "telemetry.queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Same configuration restricted to a single balance type
    pub fn only(mut self, balance_type: BalanceType) -> Self {
        self.balance_types = vec![balance_type];
        self
    }
}

/// Configuration for the external scorer side channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Forward decision events to the scorer
    #[serde(default)]
    pub enabled: bool,

    /// Scorer endpoint
    #[serde(default = "default_scorer_url")]
    pub url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_scorer_timeout")]
    pub timeout_ms: u64,

    /// Events buffered before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_scorer_url() -> String {
    "http://localhost:8000/model/pd".to_string()
}

fn default_scorer_timeout() -> u64 {
    2000
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_scorer_url(),
            timeout_ms: default_scorer_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl TelemetryConfig {
    /// Get request timeout as Duration
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

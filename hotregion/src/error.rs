//! Scheduler error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while configuring or running the scheduler
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum SchedulerError {
    #[error("Failed to allocate peer: {0}")]
    AllocPeer(String),

    #[error("Region not found: {0}")]
    RegionNotFound(u64),

    #[error("Store not found: {0}")]
    StoreNotFound(u64),

    #[error("Unknown scheduler type: {0}")]
    UnknownScheduler(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

impl SchedulerError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            SchedulerError::AllocPeer(_) => "alloc_peer",
            SchedulerError::RegionNotFound(_) => "region_not_found",
            SchedulerError::StoreNotFound(_) => "store_not_found",
            SchedulerError::UnknownScheduler(_) => "unknown_scheduler",
            SchedulerError::Config(_) => "config",
            SchedulerError::Serialization(_) => "serialization",
            SchedulerError::Io(_) => "io",
            SchedulerError::Telemetry(_) => "telemetry",
        }
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SchedulerError {
    fn from(err: toml::de::Error) -> Self {
        SchedulerError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for SchedulerError {
    fn from(err: reqwest::Error) -> Self {
        SchedulerError::Telemetry(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_labels() {
        assert_eq!(SchedulerError::AllocPeer("x".into()).error_type(), "alloc_peer");
        assert_eq!(SchedulerError::StoreNotFound(3).error_type(), "store_not_found");
        assert_eq!(
            SchedulerError::UnknownScheduler("evict".into()).error_type(),
            "unknown_scheduler"
        );
    }

    #[test]
    fn test_from_toml_error() {
        let err: SchedulerError = toml::from_str::<toml::Value>("= broken")
            .unwrap_err()
            .into();
        assert!(matches!(err, SchedulerError::Config(_)));
    }
}

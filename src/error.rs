use thiserror::Error;

use crate::model::Metric;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("MQTT error: {0}")]
    Mqtt(String),
    #[error("Invalid value: {0}")]
    Validation(String),
    #[error("Failed to fetch {metric} history: {reason}")]
    FetchFailed { metric: Metric, reason: String },
    #[error("Not connected to broker")]
    NotConnected,
    #[error("Lost connection to broker")]
    ConnectionLost,
    #[error("Power log failed: {0}")]
    LogSinkFailed(String),
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

//! Error types for E2E runs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Library build failed: {0}")]
    Build(String),

    #[error("Provisioning failed for {env}: {reason}")]
    Provision { env: String, reason: String },

    #[error("Preview server never became ready: {0}")]
    Readiness(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Test suite failed: {0}")]
    Suite(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

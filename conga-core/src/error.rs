#![forbid(unsafe_code)]

//! Common error type for Conga crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CongaError {
    /// I/O related failures.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing failures.
    #[error("Config parse error: {0}")]
    ConfigParse(toml::de::Error),

    /// Configuration parsed but failed validation.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Link capacity string that is not a valid data rate.
    #[error("Invalid data rate: {0}")]
    InvalidDataRate(String),
}

/// Convenient alias for results throughout Conga crates.
pub type CongaResult<T> = Result<T, CongaError>;

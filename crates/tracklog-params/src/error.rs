//! Error types for tracklog-params

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Parameter error type
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterError {
    #[error("Parameter not declared: {0}")]
    NotDeclared(String),

    #[error("Parameter already declared: {0}")]
    AlreadyDeclared(String),

    #[error("Parameter {name} has type {declared}, got {requested}")]
    InvalidType {
        name: String,
        declared: String,
        requested: String,
    },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<tracklog_core::Error> for ParameterError {
    fn from(err: tracklog_core::Error) -> Self {
        match err {
            tracklog_core::Error::Timeout { service } => ParameterError::Timeout(service),
            other => ParameterError::Unexpected(other.to_string()),
        }
    }
}

impl From<bincode::Error> for ParameterError {
    fn from(err: bincode::Error) -> Self {
        ParameterError::Unexpected(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ParameterError>;

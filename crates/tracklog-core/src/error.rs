//! Error types for tracklog-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Topic not advertised: {0}")]
    NotAdvertised(String),

    #[error("Type mismatch on {topic}: advertised {advertised}, got {requested}")]
    TypeMismatch {
        topic: String,
        advertised: String,
        requested: String,
    },

    #[error("Invalid topic name: {0:?}")]
    InvalidTopicName(String),

    #[error("Service already advertised: {0}")]
    ServiceExists(String),

    #[error("Request to {service} timed out")]
    Timeout { service: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

//! Parameter values, declarations and the wire messages carrying them

use crate::error::{ParameterError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Prefix every parameter type name carries
pub const MSGS_PREFIX: &str = "msgs.";

/// Prefix `type_name` with [`MSGS_PREFIX`] unless it already has it
pub fn add_msgs_prefix(type_name: &str) -> String {
    if type_name.starts_with(MSGS_PREFIX) {
        type_name.to_string()
    } else {
        format!("{MSGS_PREFIX}{type_name}")
    }
}

/// The bare type name of a prefixed type, or `None` if it is not prefixed
pub fn strip_msgs_prefix(type_name: &str) -> Option<&str> {
    type_name
        .strip_prefix(MSGS_PREFIX)
        .filter(|bare| !bare.is_empty())
}

/// A serialized parameter value tagged with its message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValue {
    pub type_name: String,
    pub value: Vec<u8>,
}

impl ParameterValue {
    /// Wrap an already serialized value
    pub fn new(type_name: &str, value: Vec<u8>) -> Self {
        Self {
            type_name: add_msgs_prefix(type_name),
            value,
        }
    }

    /// Serialize `value` with bincode
    pub fn encode<T: Serialize>(type_name: &str, value: &T) -> Result<Self> {
        Ok(Self::new(type_name, bincode::serialize(value)?))
    }

    /// Deserialize the value with bincode
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        bincode::deserialize(&self.value).map_err(|e| {
            ParameterError::Unexpected(format!("cannot decode {}: {e}", self.type_name))
        })
    }
}

/// Name and type of a declared parameter
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    pub type_name: String,
}

/// Request body for `declare_parameter` and `set_parameter`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ParameterRequest {
    pub name: String,
    pub value: ParameterValue,
}

/// Request body for `get_parameter`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ParameterName {
    pub name: String,
}

/// Every service answers with the operation's outcome
pub(crate) type Reply<T> = std::result::Result<T, ParameterError>;

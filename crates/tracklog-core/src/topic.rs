//! Topic and message types

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named channel carrying messages of one serialized type
///
/// Topics order by name first, so a `BTreeSet<Topic>` enumerates a catalog
/// alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic {
    /// Topic name, e.g. `/robot/odometry`
    pub name: String,
    /// Declared message type name, e.g. `msgs.Odometry`
    pub type_name: String,
}

impl Topic {
    /// Create a new topic
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    /// Check that a topic name is usable on a bus or in a log
    ///
    /// Names must be non-empty and may not contain whitespace.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidTopicName(name.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.type_name)
    }
}

/// A message as it travels on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Topic the message was published on
    pub topic: String,
    /// Message type name declared by the publisher
    pub type_name: String,
    /// Serialized message bytes, never inspected
    pub payload: Vec<u8>,
}

impl RawMessage {
    /// Create a new raw message
    pub fn new(topic: impl Into<String>, type_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            type_name: type_name.into(),
            payload,
        }
    }
}

/// A message as it was written to a log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// The topic the message belongs to
    pub topic: Topic,
    /// Receive time in nanoseconds
    pub time_nanos: i64,
    /// Insertion sequence number assigned by the store
    pub seq: u64,
    /// Serialized message bytes
    pub payload: Vec<u8>,
}

impl MessageRecord {
    /// Sort key: timestamp first, insertion order for ties
    pub fn order_key(&self) -> (i64, u64) {
        (self.time_nanos, self.seq)
    }

    /// Convert back to a bus message carrying the recorded type
    pub fn to_raw(&self) -> RawMessage {
        RawMessage::new(
            self.topic.name.clone(),
            self.topic.type_name.clone(),
            self.payload.clone(),
        )
    }
}

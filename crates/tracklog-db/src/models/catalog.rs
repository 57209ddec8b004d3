//! Catalog models: topics and the schema marker.

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use tracklog_core::Topic;

/// Stored topic in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredTopic {
    /// Primary key - topic name.
    #[primary_key]
    pub name: String,
    /// Message type name, fixed by the first recorded message.
    pub type_name: String,
}

impl StoredTopic {
    /// Create from a topic.
    pub fn from_topic(topic: &Topic) -> Self {
        Self {
            name: topic.name.clone(),
            type_name: topic.type_name.clone(),
        }
    }

    /// Convert to a topic.
    pub fn to_topic(&self) -> Topic {
        Topic::new(self.name.clone(), self.type_name.clone())
    }
}

/// Schema version marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct StoredSchema {
    /// Always "schema" - single row.
    #[primary_key]
    pub id: String,
    /// Layout version of the log tables.
    pub version: u32,
}

impl StoredSchema {
    /// Primary key of the single marker row.
    pub const KEY: &'static str = "schema";

    /// Create a marker for the given version.
    pub fn new(version: u32) -> Self {
        Self {
            id: Self::KEY.to_string(),
            version,
        }
    }
}

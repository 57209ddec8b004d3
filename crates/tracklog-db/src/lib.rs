//! Tracklog DB - Message log store using native_db
//!
//! Provides persistent storage for:
//! - The topic catalog (name and message type of every recorded topic)
//! - Message records (topic, receive timestamp, raw payload)
//! - A schema version marker checked on open
//!
//! A store opened with the reserved path [`MEMORY_PATH`] lives only in
//! memory and always starts empty.

mod error;
mod models;
mod queries;
mod selector;
mod store;

pub use error::{Error, Result};
pub use queries::{QueryOptions, RecordCursor};
pub use selector::TopicSelector;
pub use store::{LogStore, MEMORY_PATH, SCHEMA_VERSION};

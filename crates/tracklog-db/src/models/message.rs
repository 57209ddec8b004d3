//! Message record model.

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use tracklog_core::{MessageRecord, Topic};

/// Stored message record.
///
/// The primary key is the insertion sequence number, so a primary scan
/// yields records in write order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct StoredMessage {
    /// Primary key - insertion sequence number.
    #[primary_key]
    pub seq: u64,
    /// Topic name, references `StoredTopic::name`.
    #[secondary_key]
    pub topic: String,
    /// Receive time in nanoseconds.
    pub time_nanos: i64,
    /// Raw message bytes.
    pub payload: Vec<u8>,
}

impl StoredMessage {
    /// Convert to a record, consuming the stored row.
    pub fn into_record(self, topic: Topic) -> MessageRecord {
        MessageRecord {
            topic,
            time_nanos: self.time_nanos,
            seq: self.seq,
            payload: self.payload,
        }
    }
}

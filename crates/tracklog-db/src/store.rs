//! Log store wrapper.

use crate::error::{Error, Result};
use crate::models::*;
use native_db::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{LazyLock, Mutex, PoisonError};
use tracing::{debug, info};
use tracklog_core::Topic;

/// Reserved path naming an ephemeral, always-empty in-memory store.
pub const MEMORY_PATH: &str = ":memory:";

/// Layout version written to new stores and required of existing ones.
pub const SCHEMA_VERSION: u32 = 1;

// Static models for the database
static MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<StoredTopic>().unwrap();
    models.define::<StoredMessage>().unwrap();
    models.define::<StoredSchema>().unwrap();
    models
});

/// Append-only, time-indexed message log.
///
/// Writes are serialized internally, so `append` may be called from several
/// threads at once. Readers take their own snapshot through
/// [`query`](LogStore::query) and never block writers for longer than a
/// transaction.
pub struct LogStore {
    pub(crate) db: Database<'static>,
    location: String,
    /// Next sequence number to assign. The lock also serializes writers.
    next_seq: Mutex<u64>,
}

impl LogStore {
    /// Open or create a log at the given path.
    ///
    /// The path [`MEMORY_PATH`] opens an empty in-memory store instead. A file
    /// that exists but is not a valid log is reported as
    /// [`Error::CannotOpen`], never treated as empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new(MEMORY_PATH) {
            return Self::in_memory();
        }

        let location = path.display().to_string();
        let db = Builder::new()
            .create(&MODELS, path)
            .map_err(|e| cannot_open(&location, e))?;
        Self::init(db, location)
    }

    /// Create an in-memory log.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(|e| cannot_open(MEMORY_PATH, e))?;
        Self::init(db, MEMORY_PATH.to_string())
    }

    fn init(db: Database<'static>, location: String) -> Result<Self> {
        {
            let rw = db.rw_transaction().map_err(|e| cannot_open(&location, e))?;
            let marker: Option<StoredSchema> = rw
                .get()
                .primary(StoredSchema::KEY.to_string())
                .map_err(|e| cannot_open(&location, e))?;
            match marker {
                Some(marker) if marker.version != SCHEMA_VERSION => {
                    return Err(Error::CannotOpen {
                        path: location,
                        reason: format!(
                            "schema version {} is not supported (expected {})",
                            marker.version, SCHEMA_VERSION
                        ),
                    });
                }
                Some(_) => {}
                None => {
                    rw.insert(StoredSchema::new(SCHEMA_VERSION))
                        .map_err(|e| cannot_open(&location, e))?;
                }
            }
            rw.commit().map_err(|e| cannot_open(&location, e))?;
        }

        let next_seq = {
            let r = db.r_transaction().map_err(|e| cannot_open(&location, e))?;
            let scan = r
                .scan()
                .primary::<StoredMessage>()
                .map_err(|e| cannot_open(&location, e))?;
            let last = scan
                .all()
                .map_err(|e| cannot_open(&location, e))?
                .last()
                .transpose()
                .map_err(|e| cannot_open(&location, e))?;
            last.map_or(0, |m| m.seq + 1)
        };

        info!(path = %location, records = next_seq, "opened log store");
        Ok(Self {
            db,
            location,
            next_seq: Mutex::new(next_seq),
        })
    }

    /// Path the store was opened with, or `:memory:`.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Whether the store lives only in memory.
    pub fn is_in_memory(&self) -> bool {
        self.location == MEMORY_PATH
    }

    /// Schema version recorded in the store.
    pub fn schema_version(&self) -> Result<u32> {
        let r = self.db.r_transaction()?;
        let marker: Option<StoredSchema> = r.get().primary(StoredSchema::KEY.to_string())?;
        Ok(marker.map_or(SCHEMA_VERSION, |m| m.version))
    }

    /// The full topic catalog.
    pub fn topics(&self) -> Result<BTreeSet<Topic>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().primary::<StoredTopic>()?;
        let iter = scan.all()?;
        let topics: std::result::Result<Vec<StoredTopic>, _> = iter.collect();
        let topics = topics.map_err(|e| Error::Database(e.to_string()))?;
        Ok(topics.iter().map(StoredTopic::to_topic).collect())
    }

    /// Look up one topic by name.
    pub fn topic(&self, name: &str) -> Result<Option<Topic>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredTopic> = r.get().primary(name.to_string())?;
        Ok(stored.map(|s| s.to_topic()))
    }

    /// Append a record, registering the topic on first use.
    ///
    /// Returns the sequence number assigned to the record. The topic entry
    /// and the record are written in one transaction, so a record never
    /// references a topic missing from the catalog.
    pub fn append(&self, topic: &Topic, time_nanos: i64, payload: &[u8]) -> Result<u64> {
        Topic::validate_name(&topic.name)?;
        let mut next_seq = self.next_seq.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = *next_seq;

        let rw = self.db.rw_transaction().map_err(write_failed)?;
        let existing: Option<StoredTopic> = rw
            .get()
            .primary(topic.name.clone())
            .map_err(write_failed)?;
        match existing {
            Some(stored) if stored.type_name != topic.type_name => {
                return Err(Error::TypeMismatch {
                    topic: topic.name.clone(),
                    recorded: stored.type_name,
                    requested: topic.type_name.clone(),
                });
            }
            Some(_) => {}
            None => {
                rw.insert(StoredTopic::from_topic(topic))
                    .map_err(write_failed)?;
                debug!(topic = %topic, "registered topic");
            }
        }
        rw.insert(StoredMessage {
            seq,
            topic: topic.name.clone(),
            time_nanos,
            payload: payload.to_vec(),
        })
        .map_err(write_failed)?;
        rw.commit().map_err(write_failed)?;

        *next_seq = seq + 1;
        Ok(seq)
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("location", &self.location)
            .finish()
    }
}

fn cannot_open(path: &str, err: native_db::db_type::Error) -> Error {
    Error::CannotOpen {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

fn write_failed(err: native_db::db_type::Error) -> Error {
    Error::WriteFailed(err.to_string())
}

impl From<native_db::db_type::Error> for Error {
    fn from(err: native_db::db_type::Error) -> Self {
        Error::Database(err.to_string())
    }
}

//! Recording live topics into a log

use crate::config::RecorderConfig;
use crate::Result;
use chrono::Utc;
use regex::Regex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use tracklog_core::{Bus, Callback, RawMessage, SubscriptionId, Topic};
use tracklog_db::{LogStore, TopicSelector};

/// Arrival time of a message, nanoseconds since the Unix epoch
fn arrival_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Recorder
///
/// Selects topics among those currently advertised on the bus, then
/// subscribes to them and appends every delivered message to the log.
/// The selection closes once recording starts, and a recorder starts at
/// most once.
pub struct Recorder {
    store: Arc<LogStore>,
    bus: Arc<dyn Bus>,
    config: RecorderConfig,
    selector: TopicSelector,
    started: bool,
}

impl Recorder {
    /// Create a recorder writing into an open log
    pub fn new(store: Arc<LogStore>, bus: Arc<dyn Bus>) -> Self {
        Self {
            store,
            bus,
            config: RecorderConfig::default(),
            selector: TopicSelector::new(),
            started: false,
        }
    }

    /// Open (or create) the log at `path` and create a recorder over it
    pub fn open(path: impl AsRef<Path>, bus: Arc<dyn Bus>) -> Result<Self> {
        let store = LogStore::open(path)?;
        Ok(Self::new(Arc::new(store), bus))
    }

    /// Replace the recorder settings
    pub fn with_config(mut self, config: RecorderConfig) -> Self {
        self.config = config;
        self
    }

    /// The log being written
    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    /// Topics selected so far
    pub fn selection(&self) -> &TopicSelector {
        &self.selector
    }

    /// Whether recording was started from this recorder
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Select a live topic by exact name
    ///
    /// Returns `false` if no such topic is advertised or recording already
    /// started.
    pub fn add_topic(&mut self, name: &str) -> bool {
        if self.started {
            debug!(topic = name, "selection is closed once recording started");
            return false;
        }
        self.selector.add_exact(&self.bus.topic_list(), name)
    }

    /// Select every live topic whose whole name matches `pattern`
    ///
    /// Returns the number of matching topics, or `-1` when nothing is
    /// advertised on the bus or recording already started.
    pub fn add_topic_pattern(&mut self, pattern: &Regex) -> i64 {
        if self.started {
            debug!(pattern = pattern.as_str(), "selection is closed once recording started");
            return -1;
        }
        self.selector.add_pattern(&self.bus.topic_list(), pattern)
    }

    /// Subscribe to the selection and start appending
    ///
    /// Returns `None` when nothing is selected, the settings are invalid, no
    /// subscription could be made, or recording already started.
    pub fn start(&mut self) -> Option<RecordingHandle> {
        if self.started {
            debug!("recording already started");
            return None;
        }
        if let Err(e) = self.config.validate() {
            warn!(error = %e, "refusing to start recording");
            return None;
        }
        if self.selector.is_empty() {
            debug!("no topics selected for recording");
            return None;
        }

        let shared = Arc::new(RecordingShared {
            store: self.store.clone(),
            max_consecutive_failures: self.config.max_consecutive_failures,
            recorded: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            stopped: AtomicBool::new(false),
            failed: AtomicBool::new(false),
        });

        let mut subscriptions = Vec::with_capacity(self.selector.len());
        for name in self.selector.iter() {
            let callback: Callback = {
                let shared = shared.clone();
                Arc::new(move |msg: &RawMessage| shared.on_message(msg))
            };
            match self.bus.subscribe(name, callback) {
                Ok(id) => subscriptions.push(id),
                Err(e) => warn!(topic = name, error = %e, "cannot subscribe"),
            }
        }
        if subscriptions.is_empty() {
            return None;
        }

        self.started = true;
        info!(
            store = self.store.location(),
            topics = subscriptions.len(),
            "recording started"
        );
        Some(RecordingHandle {
            bus: self.bus.clone(),
            shared,
            subscriptions: Mutex::new(subscriptions),
        })
    }
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("store", &self.store.location())
            .field("selected", &self.selector.len())
            .field("started", &self.started)
            .finish()
    }
}

/// State shared between a handle and its bus callbacks
struct RecordingShared {
    store: Arc<LogStore>,
    max_consecutive_failures: u32,
    recorded: AtomicU64,
    write_failures: AtomicU64,
    skipped: AtomicU64,
    consecutive_failures: AtomicU32,
    stopped: AtomicBool,
    failed: AtomicBool,
}

impl RecordingShared {
    fn on_message(&self, msg: &RawMessage) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let topic = Topic::new(msg.topic.as_str(), msg.type_name.as_str());
        match self.store.append(&topic, arrival_nanos(), &msg.payload) {
            Ok(_) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
            Err(e @ tracklog_db::Error::TypeMismatch { .. }) => {
                // The message is at fault, not the log
                self.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %topic, error = %e, "skipping message");
            }
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                let consecutive = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(topic = %topic, error = %e, "append failed, message dropped");
                if consecutive >= self.max_consecutive_failures {
                    error!(
                        failures = consecutive,
                        "too many consecutive append failures, recording abandoned"
                    );
                    self.failed.store(true, Ordering::Release);
                    self.stopped.store(true, Ordering::Release);
                }
            }
        }
    }
}

/// Counters for a recording
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingStats {
    /// Messages appended to the log
    pub messages_recorded: u64,
    /// Messages lost to append failures
    pub write_failures: u64,
    /// Messages rejected because their type differs from the logged topic's
    pub skipped: u64,
}

/// Handle to an active recording
///
/// Stopping, or dropping the handle, removes every subscription.
pub struct RecordingHandle {
    bus: Arc<dyn Bus>,
    shared: Arc<RecordingShared>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl RecordingHandle {
    /// Unsubscribe from every topic. Idempotent.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if subscriptions.is_empty() {
            return;
        }
        for id in subscriptions {
            self.bus.unsubscribe(id);
        }
        info!(
            recorded = self.shared.recorded.load(Ordering::Relaxed),
            "recording stopped"
        );
    }

    /// Whether messages are still being appended
    pub fn is_recording(&self) -> bool {
        !self.shared.stopped.load(Ordering::Acquire)
    }

    /// Whether recording was abandoned after repeated append failures
    pub fn failed(&self) -> bool {
        self.shared.failed.load(Ordering::Acquire)
    }

    /// Snapshot of the recording counters
    pub fn stats(&self) -> RecordingStats {
        RecordingStats {
            messages_recorded: self.shared.recorded.load(Ordering::Relaxed),
            write_failures: self.shared.write_failures.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RecordingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHandle")
            .field("recording", &self.is_recording())
            .field("stats", &self.stats())
            .finish()
    }
}

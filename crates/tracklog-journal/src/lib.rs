//! Tracklog Journal - Recording and timing-faithful playback
//!
//! This crate builds on `tracklog-db`'s log store to provide:
//!
//! - **Recorder**: Subscribe to live topics and append every message to a log
//! - **Playback**: Republish a log onto a bus with its recorded timing
//! - **Config**: RON settings for both
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use regex::Regex;
//! use tracklog_core::MemoryBus;
//! use tracklog_journal::{Playback, PlaybackConfig, Recorder};
//!
//! let bus = Arc::new(MemoryBus::new());
//!
//! // Record every /sensors topic
//! let mut recorder = Recorder::open("run.tlog", bus.clone())?;
//! recorder.add_topic_pattern(&Regex::new("/sensors/.*")?);
//! let recording = recorder.start().expect("nothing to record");
//! // ... traffic flows ...
//! recording.stop();
//! drop(recorder);
//!
//! // Replay it at double speed
//! let mut playback = Playback::open("run.tlog", bus)?
//!     .with_config(PlaybackConfig::default().with_rate(2.0));
//! playback.add_topic_pattern(&Regex::new("/sensors/.*")?);
//! let session = playback.start().expect("nothing to play");
//! session.wait_until_finished(Duration::from_secs(60));
//! ```

mod config;
mod error;
mod playback;
mod recorder;
mod session;

pub use config::{PlaybackConfig, RecorderConfig};
pub use error::{Error, Result};
pub use playback::{Playback, PlaybackHandle, PlaybackState};
pub use recorder::{Recorder, RecordingHandle, RecordingStats};
pub use session::SessionStats;

// Re-export the log types callers need alongside the controllers
pub use tracklog_db::{LogStore, TopicSelector, MEMORY_PATH};

//! Tracklog Core - Message types and bus interface
//!
//! This crate provides the shared vocabulary for the tracklog workspace:
//! - Topic and message record types (`Topic`, `RawMessage`, `MessageRecord`)
//! - Nanosecond time helpers (`TimeRange`)
//! - The `Bus` and `Services` traits that recorders and players talk to
//! - `MemoryBus`, an in-process bus for embedding and tests
//!
//! ## Bus Boundary
//!
//! The real pub/sub transport lives outside this workspace. Anything that
//! can advertise, publish and subscribe by topic name can back a recorder
//! or a player by implementing [`Bus`].

pub mod bus;
mod error;
mod memory_bus;
mod time;
mod topic;

pub use bus::{Bus, Callback, ServiceHandler, Services, SubscriptionId};
pub use error::{Error, Result};
pub use memory_bus::MemoryBus;
pub use time::{duration_to_nanos, nanos_to_duration, TimeRange, NANOS_PER_SEC};
pub use topic::{MessageRecord, RawMessage, Topic};

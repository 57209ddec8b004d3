//! Database models for persistent storage.

mod catalog;
mod message;

pub use catalog::*;
pub use message::*;

//! Bus traits for topic transport
//!
//! These traits define what recorders and players need from the pub/sub
//! layer. Users implement them for their transport of choice; [`MemoryBus`]
//! is the in-process implementation.
//!
//! [`MemoryBus`]: crate::MemoryBus

use crate::{RawMessage, Result, Topic};
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked for every message delivered on a subscribed topic
///
/// Callbacks may run on any thread the bus chooses, and may run concurrently
/// for different topics.
pub type Callback = Arc<dyn Fn(&RawMessage) + Send + Sync>;

/// Handler answering a request/response service call
///
/// Receives the serialized request and returns the serialized response.
pub type ServiceHandler = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Identifier returned by [`Bus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Topic-based publish/subscribe transport
///
/// Delivery order is preserved per topic. Ordering across topics is not
/// guaranteed.
pub trait Bus: Send + Sync {
    /// Announce that messages of `type_name` will be published on `topic`
    ///
    /// Advertising an already advertised topic with the same type is a no-op.
    fn advertise(&self, topic: &str, type_name: &str) -> Result<()>;

    /// Publish a message on an advertised topic
    fn publish(&self, msg: &RawMessage) -> Result<()>;

    /// Subscribe to a topic, whether or not it is advertised yet
    fn subscribe(&self, topic: &str, callback: Callback) -> Result<SubscriptionId>;

    /// Drop a subscription
    ///
    /// Returns `false` if the subscription was unknown (already removed).
    fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Topics currently advertised on the bus
    fn topic_list(&self) -> Vec<Topic>;
}

/// Request/response services layered on the same transport
pub trait Services: Send + Sync {
    /// Register a handler for a service name
    fn advertise_service(&self, service: &str, handler: ServiceHandler) -> Result<()>;

    /// Call a service, waiting at most `timeout` for the response
    ///
    /// Returns [`Error::Timeout`](crate::Error::Timeout) when nobody answers
    /// in time, including when no handler is registered.
    fn request(&self, service: &str, request: &[u8], timeout: Duration) -> Result<Vec<u8>>;
}

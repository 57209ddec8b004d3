//! In-process bus
//!
//! `MemoryBus` delivers messages synchronously on the publishing thread.
//! Subscriber callbacks are invoked with no internal lock held, so a callback
//! may publish, subscribe or unsubscribe on the same bus.

use crate::bus::{Bus, Callback, ServiceHandler, Services, SubscriptionId};
use crate::{Error, RawMessage, Result, Topic};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Default)]
struct BusState {
    /// Advertised topic name -> type name, in advertise order
    topics: IndexMap<String, String>,
    /// Subscription id -> (topic, callback), in subscribe order
    subscribers: IndexMap<u64, (String, Callback)>,
    /// Service name -> handler
    services: HashMap<String, ServiceHandler>,
}

/// In-process publish/subscribe bus
#[derive(Default)]
pub struct MemoryBus {
    state: Mutex<BusState>,
    next_subscription: AtomicU64,
    delivered: AtomicU64,
}

impl MemoryBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of callback invocations performed so far
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Bus for MemoryBus {
    fn advertise(&self, topic: &str, type_name: &str) -> Result<()> {
        Topic::validate_name(topic)?;
        let mut state = self.lock();
        match state.topics.get(topic) {
            Some(existing) if existing != type_name => Err(Error::TypeMismatch {
                topic: topic.to_string(),
                advertised: existing.clone(),
                requested: type_name.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                debug!(topic, type_name, "advertised topic");
                state
                    .topics
                    .insert(topic.to_string(), type_name.to_string());
                Ok(())
            }
        }
    }

    fn publish(&self, msg: &RawMessage) -> Result<()> {
        let callbacks: Vec<Callback> = {
            let state = self.lock();
            match state.topics.get(&msg.topic) {
                None => return Err(Error::NotAdvertised(msg.topic.clone())),
                Some(advertised) if *advertised != msg.type_name => {
                    return Err(Error::TypeMismatch {
                        topic: msg.topic.clone(),
                        advertised: advertised.clone(),
                        requested: msg.type_name.clone(),
                    })
                }
                Some(_) => {}
            }
            state
                .subscribers
                .values()
                .filter(|(topic, _)| *topic == msg.topic)
                .map(|(_, callback)| callback.clone())
                .collect()
        };

        trace!(topic = %msg.topic, subscribers = callbacks.len(), "publish");
        for callback in callbacks {
            callback(msg);
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str, callback: Callback) -> Result<SubscriptionId> {
        Topic::validate_name(topic)?;
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .subscribers
            .insert(id, (topic.to_string(), callback));
        debug!(topic, id, "subscribed");
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.shift_remove(&id.0).is_some()
    }

    fn topic_list(&self) -> Vec<Topic> {
        self.lock()
            .topics
            .iter()
            .map(|(name, type_name)| Topic::new(name.clone(), type_name.clone()))
            .collect()
    }
}

impl Services for MemoryBus {
    fn advertise_service(&self, service: &str, handler: ServiceHandler) -> Result<()> {
        let mut state = self.lock();
        if state.services.contains_key(service) {
            return Err(Error::ServiceExists(service.to_string()));
        }
        state.services.insert(service.to_string(), handler);
        debug!(service, "advertised service");
        Ok(())
    }

    fn request(&self, service: &str, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let timed_out = || Error::Timeout {
            service: service.to_string(),
        };
        let handler = self
            .lock()
            .services
            .get(service)
            .cloned()
            .ok_or_else(timed_out)?;

        // The handler runs on its own thread so a slow responder cannot hold
        // the caller past its timeout.
        let (tx, rx) = mpsc::channel();
        let request = request.to_vec();
        thread::Builder::new()
            .name(format!("tracklog-service:{service}"))
            .spawn(move || {
                let _ = tx.send(handler(&request));
            })
            .map_err(|_| timed_out())?;

        rx.recv_timeout(timeout).map_err(|_| timed_out())
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryBus")
            .field("topics", &state.topics.len())
            .field("subscribers", &state.subscribers.len())
            .field("services", &state.services.len())
            .finish()
    }
}

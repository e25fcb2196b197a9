use crate::bus::{Bus, BusError, BusEvent, BusOp, InboundMessage, SubscriptionSet};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct BusLog {
    ops: Vec<BusOp>,
    subscriptions: SubscriptionSet,
    retained: HashMap<String, String>,
}

/// In-process bus that records every operation
///
/// Clones share the same log, so a handle kept outside the engine can
/// inspect what the engine did after the bus has been moved into it.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    log: Arc<Mutex<BusLog>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, BusLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All operations in issuance order
    pub fn ops(&self) -> Vec<BusOp> {
        self.log().ops.clone()
    }

    /// Drain the recorded operations
    pub fn take_ops(&self) -> Vec<BusOp> {
        std::mem::take(&mut self.log().ops)
    }

    /// `(topic, payload)` of every publish, in order
    pub fn publications(&self) -> Vec<(String, String)> {
        self.log()
            .ops
            .iter()
            .filter_map(|op| match op {
                BusOp::Publish { topic, payload, .. } => Some((topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    /// Payloads published to one topic, in order
    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.publications()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
            .collect()
    }

    /// Current retained payload for a topic
    pub fn retained(&self, topic: &str) -> Option<String> {
        self.log().retained.get(topic).cloned()
    }

    pub fn is_subscribed(&self, filter: &str) -> bool {
        self.log().subscriptions.contains(filter)
    }

    pub fn subscriptions(&self) -> SubscriptionSet {
        self.log().subscriptions.clone()
    }

    /// Build the event a broker would deliver, or None if nothing subscribed matches
    pub fn deliver(&self, topic: &str, payload: &str) -> Option<BusEvent> {
        if self.log().subscriptions.matches(topic) {
            Some(BusEvent::Message(InboundMessage::new(topic, payload)))
        } else {
            None
        }
    }

    /// Forget all subscriptions, as a broker without persistent sessions would on reconnect
    pub fn drop_subscriptions(&self) {
        self.log().subscriptions = SubscriptionSet::new();
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn subscribe(&mut self, filter: &str) -> Result<(), BusError> {
        let mut log = self.log();
        log.subscriptions.insert(filter);
        log.ops.push(BusOp::Subscribe {
            topic: filter.to_string(),
        });
        Ok(())
    }

    async fn unsubscribe(&mut self, filter: &str) -> Result<(), BusError> {
        let mut log = self.log();
        log.subscriptions.remove(filter);
        log.ops.push(BusOp::Unsubscribe {
            topic: filter.to_string(),
        });
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &str, retained: bool) -> Result<(), BusError> {
        let mut log = self.log();
        if retained {
            if payload.is_empty() {
                log.retained.remove(topic);
            } else {
                log.retained.insert(topic.to_string(), payload.to_string());
            }
        }
        log.ops.push(BusOp::Publish {
            topic: topic.to_string(),
            payload: payload.to_string(),
            retained,
        });
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

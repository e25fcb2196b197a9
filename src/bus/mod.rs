//! Bus capability consumed by the saver core
//!
//! The transport itself (broker connection, TLS, authentication, reconnects)
//! lives outside this crate. The core needs exactly four things from it:
//! subscribe, unsubscribe, publish and one ordered stream of inbound events.
//!
//! ## Implementations
//!
//! - `MemoryBus` - records every operation and keeps a retained store, used
//!   by tests and by embedders that wire their own transport
//! - `JsonlBus` - writes operations as JSON lines, paired with the line
//!   reader in `stdio` to run the saver behind a pipe

pub mod filter;
pub mod memory;
pub mod stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use filter::{topic_matches, SubscriptionSet};
pub use memory::MemoryBus;
pub use stdio::{parse_line, run_line_reader, spawn_stdin_reader, InboundLine, JsonlBus};

#[derive(Debug)]
pub enum BusError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Closed,
}

impl From<std::io::Error> for BusError {
    fn from(err: std::io::Error) -> Self {
        BusError::Io(err)
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err)
    }
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::Io(e) => write!(f, "IO error: {}", e),
            BusError::Serialization(e) => write!(f, "Serialization error: {}", e),
            BusError::Closed => write!(f, "Bus channel closed"),
        }
    }
}

impl std::error::Error for BusError {}

/// One message delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub topic: String,
    #[serde(default)]
    pub payload: String,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Events sent from the transport to the dispatcher over a single ordered channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Message(InboundMessage),
    /// Transport reconnected; subscriptions may have been lost
    Reconnected,
    Shutdown,
}

/// Outbound operation as recorded by `MemoryBus` and written by `JsonlBus`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BusOp {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Publish { topic: String, payload: String, retained: bool },
}

/// Outbound side of the topic bus
///
/// Calls issued by one owner are observed by the transport in issuance order.
/// Publishing is fire-and-forget from the core's point of view: errors are
/// reported but never retried here.
#[async_trait]
pub trait Bus: Send {
    /// Subscribe to a topic filter (`+` matches one level, `#` the rest)
    async fn subscribe(&mut self, filter: &str) -> Result<(), BusError>;

    async fn unsubscribe(&mut self, filter: &str) -> Result<(), BusError>;

    /// Publish a UTF-8 payload; an empty retained payload clears the topic
    async fn publish(&mut self, topic: &str, payload: &str, retained: bool) -> Result<(), BusError>;

    /// Push out anything still buffered
    async fn flush(&mut self) -> Result<(), BusError>;

    /// Get bus type for logging
    fn name(&self) -> &'static str;
}

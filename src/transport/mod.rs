//! Transport collaborator for dump sessions.
//!
//! The session never talks to a socket itself. It is handed deliveries one at a
//! time and asks the subscription to close; everything else (framing,
//! connecting, reading) lives behind these traits.

pub mod frame;
pub mod replay;

use crate::dump::DumpRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub use frame::FrameTransport;
pub use replay::ReplayTransport;

/// Fault reported by the transport instead of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFault {
    pub description: String,
}

impl TransportFault {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// One delivery from the transport. A missing delivery (`None` where an
/// `Option<Inbound>` is expected) means the connection was lost.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Decoded message payload of unknown shape.
    Payload(Value),
    /// Transport-level error indicator.
    Fault(TransportFault),
}

impl From<Value> for Inbound {
    fn from(value: Value) -> Self {
        Inbound::Payload(value)
    }
}

/// Handle that can terminate a running subscription.
pub trait Subscription {
    /// Terminate the subscription. Calling it more than once is harmless.
    fn close(&mut self);
}

/// A pub/sub connection able to carry one dump subscription.
#[async_trait]
pub trait Transport: Subscription + Send {
    /// Send the dump request and start receiving its messages.
    async fn subscribe(&mut self, request: &DumpRequest) -> anyhow::Result<()>;

    /// Next delivery, `None` once the connection is gone or closed.
    async fn recv(&mut self) -> Option<Inbound>;
}

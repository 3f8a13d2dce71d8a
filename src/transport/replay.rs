//! In-memory transport replaying a fixed delivery sequence.

use super::{Inbound, Subscription, Transport};
use crate::dump::DumpRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;

/// Replays scripted deliveries in order. `None` entries stand for a lost
/// connection. Nothing is delivered once the subscription is closed.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    deliveries: VecDeque<Option<Inbound>>,
    request: Option<DumpRequest>,
    close_calls: usize,
    fail_subscribe: Option<String>,
}

impl ReplayTransport {
    pub fn new(deliveries: impl IntoIterator<Item = Option<Inbound>>) -> Self {
        Self {
            deliveries: deliveries.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Replay plain message payloads.
    pub fn from_messages(messages: impl IntoIterator<Item = Value>) -> Self {
        Self::new(messages.into_iter().map(|m| Some(Inbound::Payload(m))))
    }

    /// Make `subscribe` fail with the given description.
    pub fn failing_subscribe(mut self, description: impl Into<String>) -> Self {
        self.fail_subscribe = Some(description.into());
        self
    }

    /// The request the transport was subscribed with.
    pub fn request(&self) -> Option<&DumpRequest> {
        self.request.as_ref()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls > 0
    }

    /// Deliveries not yet handed out.
    pub fn pending(&self) -> usize {
        self.deliveries.len()
    }
}

impl Subscription for ReplayTransport {
    fn close(&mut self) {
        self.close_calls += 1;
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn subscribe(&mut self, request: &DumpRequest) -> anyhow::Result<()> {
        if let Some(description) = &self.fail_subscribe {
            anyhow::bail!("{}", description);
        }
        self.request = Some(request.clone());
        Ok(())
    }

    async fn recv(&mut self) -> Option<Inbound> {
        if self.is_closed() {
            return None;
        }
        self.deliveries.pop_front().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_in_order_until_closed() {
        let mut transport = ReplayTransport::from_messages(vec![
            json!({"type": "dump.start"}),
            json!({"type": "dump.end"}),
        ]);
        transport
            .subscribe(&DumpRequest::new("Default", None))
            .await
            .unwrap();
        assert_eq!(transport.request().unwrap().dataset, "Default");

        let first = transport.recv().await.unwrap();
        assert_eq!(first, Inbound::Payload(json!({"type": "dump.start"})));

        transport.close();
        assert!(transport.recv().await.is_none());
        assert_eq!(transport.pending(), 1);
    }

    #[tokio::test]
    async fn test_failing_subscribe() {
        let mut transport = ReplayTransport::default().failing_subscribe("unreachable");
        let err = transport
            .subscribe(&DumpRequest::new("Default", None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unreachable");
        assert!(transport.request().is_none());
    }
}

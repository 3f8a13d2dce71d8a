//! Dump client.
//!
//! Subscribes a transport and pumps its deliveries into a [`DumpSession`]
//! until the session reaches a terminal state.

use super::command::Command;
use super::session::{DumpSession, DumpSummary};
use crate::error::DumpError;
use crate::transport::Transport;

pub struct DumpClient<T> {
    transport: T,
    session: DumpSession,
}

impl<T: Transport> DumpClient<T> {
    pub fn new(transport: T, session: DumpSession) -> Self {
        Self { transport, session }
    }

    /// Run the dump to completion. Commands reach `emit` in arrival order.
    pub async fn run<F>(&mut self, mut emit: F) -> Result<DumpSummary, DumpError>
    where
        F: FnMut(Command) -> anyhow::Result<()>,
    {
        if let Some(outcome) = self.session.outcome() {
            return outcome;
        }

        let request = self.session.request();
        tracing::info!(
            dataset = %request.dataset,
            messages_per_second = ?request.body.messages_per_second,
            "requesting dump"
        );

        if let Err(e) = self.transport.subscribe(&request).await {
            self.session
                .abort(DumpError::Transport(format!("{:#}", e)), &mut self.transport);
        } else {
            self.session.activate();
        }

        loop {
            if let Some(outcome) = self.session.outcome() {
                return outcome;
            }
            let inbound = self.transport.recv().await;
            self.session.handle(inbound, &mut self.transport, &mut emit);
        }
    }

    pub fn session(&self) -> &DumpSession {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

//! Dump session state machine.
//!
//! A session multiplexes any number of concurrently reporting workers into
//! one lifecycle: `Idle -> Active -> {Completed, Failed}`. Each worker opens
//! with `dump.start` and closes with `dump.end`; the session completes when
//! the nested counter drops back to zero (or below, on a protocol slip).

use super::command::Command;
use super::message::{classify, DumpMessage, DumpRequest};
use super::progress::{ProgressEstimator, ProgressReport};
use super::translate::{translate_column, translate_record, translate_table};
use crate::error::DumpError;
use crate::transport::{Inbound, Subscription};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Lifecycle callbacks of a session.
pub trait DumpObserver {
    /// Every classified message, before it is applied. `progress` reflects
    /// the state prior to this message.
    fn on_progress(&mut self, _message: &Value, _progress: &ProgressReport) {}

    /// Clean completion. Called at most once.
    fn on_finish(&mut self) {}

    /// Failure. Called at most once, after the subscription is closed.
    fn on_error(&mut self, _error: &DumpError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DumpObserver for NoopObserver {}

/// Counts of a completed dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpSummary {
    pub forecasted: u64,
    pub received: u64,
}

pub struct DumpSession {
    dataset: String,
    messages_per_second: u32,
    state: SessionState,
    active_workers: i64,
    error: Option<DumpError>,
    progress: ProgressEstimator,
    observer: Box<dyn DumpObserver + Send>,
}

impl DumpSession {
    pub fn new(dataset: impl Into<String>, messages_per_second: u32) -> Self {
        let messages_per_second = messages_per_second.max(1);
        Self {
            dataset: dataset.into(),
            messages_per_second,
            state: SessionState::Idle,
            active_workers: 0,
            error: None,
            progress: ProgressEstimator::new(messages_per_second),
            observer: Box::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: impl DumpObserver + Send + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// The subscription request for this session.
    pub fn request(&self) -> DumpRequest {
        DumpRequest::new(self.dataset.clone(), Some(self.messages_per_second))
    }

    /// Mark the subscription as open. Progress timing starts here.
    pub fn activate(&mut self) {
        if self.state == SessionState::Idle {
            self.progress = ProgressEstimator::new(self.messages_per_second);
            self.state = SessionState::Active;
            tracing::info!(dataset = %self.dataset, "dump started");
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn active_workers(&self) -> i64 {
        self.active_workers
    }

    pub fn error(&self) -> Option<&DumpError> {
        self.error.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn progress(&self) -> &ProgressEstimator {
        &self.progress
    }

    /// Final result once the session is terminal, `None` before that.
    pub fn outcome(&self) -> Option<Result<DumpSummary, DumpError>> {
        match (self.state, &self.error) {
            (SessionState::Completed, _) => Some(Ok(DumpSummary {
                forecasted: self.progress.forecasted(),
                received: self.progress.received(),
            })),
            (SessionState::Failed, Some(error)) => Some(Err(error.clone())),
            _ => None,
        }
    }

    /// Process one delivery. Commands are handed to `emit` in delivery order.
    /// Nothing happens unless the session is active.
    pub fn handle<S, F>(
        &mut self,
        inbound: Option<Inbound>,
        subscription: &mut S,
        emit: &mut F,
    ) -> SessionState
    where
        S: Subscription + ?Sized,
        F: FnMut(Command) -> anyhow::Result<()>,
    {
        if self.state != SessionState::Active {
            tracing::trace!(state = ?self.state, "ignoring delivery on inactive session");
            return self.state;
        }

        let message = match classify(inbound.as_ref()) {
            Ok(message) => message,
            Err(error) => {
                self.abort(error, subscription);
                return self.state;
            }
        };

        if let Some(Inbound::Payload(raw)) = &inbound {
            let report = self.progress.report();
            self.observer.on_progress(raw, &report);
        }

        tracing::debug!(kind = ?message.kind(), workers = self.active_workers, "dump message");

        match message {
            DumpMessage::Start { .. } => {
                self.active_workers += 1;
            }
            DumpMessage::End { .. } => {
                self.active_workers -= 1;
                if self.active_workers < 0 {
                    tracing::warn!(
                        workers = self.active_workers,
                        "dump.end without matching dump.start"
                    );
                }
                if self.active_workers <= 0 {
                    self.complete(subscription);
                }
            }
            DumpMessage::Forecast { body, .. } => {
                self.progress.record_forecast(body.n_messages);
            }
            DumpMessage::Table { dataset, body } => {
                let command = translate_table(dataset, &body);
                self.deliver(command.into(), subscription, emit);
            }
            DumpMessage::Column { dataset, body } => {
                let command = translate_column(dataset, &body);
                self.deliver(command.into(), subscription, emit);
            }
            DumpMessage::Record(record) => {
                let command = Command::Add(translate_record(&record));
                self.deliver(command, subscription, emit);
            }
            DumpMessage::Result(report) | DumpMessage::Error(report) => {
                if report.is_failure() {
                    self.abort(report.into_error(), subscription);
                }
            }
            DumpMessage::Unknown(kind) => {
                tracing::debug!(%kind, "ignoring unrecognized message");
            }
        }

        self.state
    }

    /// Fail the session: close the subscription, then report. First error wins.
    pub fn abort<S>(&mut self, error: DumpError, subscription: &mut S)
    where
        S: Subscription + ?Sized,
    {
        if self.state.is_terminal() {
            return;
        }
        subscription.close();
        self.state = SessionState::Failed;
        tracing::error!(dataset = %self.dataset, %error, "dump failed");
        self.observer.on_error(&error);
        self.error = Some(error);
    }

    fn complete<S>(&mut self, subscription: &mut S)
    where
        S: Subscription + ?Sized,
    {
        subscription.close();
        self.state = SessionState::Completed;
        tracing::info!(
            dataset = %self.dataset,
            received = self.progress.received(),
            forecasted = self.progress.forecasted(),
            "dump finished"
        );
        self.observer.on_finish();
    }

    fn deliver<S, F>(&mut self, command: Command, subscription: &mut S, emit: &mut F)
    where
        S: Subscription + ?Sized,
        F: FnMut(Command) -> anyhow::Result<()>,
    {
        self.progress.record_delivery();
        if let Err(e) = emit(command) {
            self.abort(DumpError::Sink(format!("{:#}", e)), subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportFault;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingSubscription {
        closes: usize,
    }

    impl Subscription for CountingSubscription {
        fn close(&mut self) {
            self.closes += 1;
        }
    }

    #[derive(Default)]
    struct Events {
        progress: Vec<Value>,
        finished: usize,
        errors: Vec<DumpError>,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Events>>);

    impl DumpObserver for Recorder {
        fn on_progress(&mut self, message: &Value, _progress: &ProgressReport) {
            self.0.lock().unwrap().progress.push(message.clone());
        }

        fn on_finish(&mut self) {
            self.0.lock().unwrap().finished += 1;
        }

        fn on_error(&mut self, error: &DumpError) {
            self.0.lock().unwrap().errors.push(error.clone());
        }
    }

    struct Harness {
        session: DumpSession,
        subscription: CountingSubscription,
        commands: Vec<Command>,
        events: Recorder,
    }

    impl Harness {
        fn new() -> Self {
            let events = Recorder::default();
            let mut session = DumpSession::new("Default", 10000).with_observer(events.clone());
            session.activate();
            Self {
                session,
                subscription: CountingSubscription::default(),
                commands: Vec::new(),
                events,
            }
        }

        fn feed(&mut self, inbound: Option<Inbound>) -> SessionState {
            let commands = &mut self.commands;
            self.session
                .handle(inbound, &mut self.subscription, &mut |command| {
                    commands.push(command);
                    Ok(())
                })
        }

        fn send(&mut self, message: Value) -> SessionState {
            self.feed(Some(Inbound::Payload(message)))
        }
    }

    fn start() -> Value {
        json!({"type": "dump.start", "dataset": "Default"})
    }

    fn end() -> Value {
        json!({"type": "dump.end", "dataset": "Default"})
    }

    fn record(n: i64) -> Value {
        json!({"type": "dump.record", "dataset": "Default", "inReplyTo": "r1",
               "body": {"table": "Memos", "key": n}})
    }

    #[test]
    fn test_request_carries_rate() {
        let session = DumpSession::new("Books", 0);
        let request = session.request();
        assert_eq!(request.dataset, "Books");
        assert_eq!(request.body.messages_per_second, Some(1));
    }

    #[test]
    fn test_idle_session_ignores_deliveries() {
        let mut session = DumpSession::new("Default", 10000);
        let mut subscription = CountingSubscription::default();
        let state = session.handle(Some(Inbound::Payload(start())), &mut subscription, &mut |_| {
            Ok(())
        });
        assert_eq!(state, SessionState::Idle);
        assert_eq!(session.active_workers(), 0);
    }

    #[test]
    fn test_nested_workers_complete() {
        let mut h = Harness::new();
        h.send(start());
        h.send(start());
        assert_eq!(h.session.active_workers(), 2);

        assert_eq!(h.send(end()), SessionState::Active);
        assert_eq!(h.subscription.closes, 0);

        assert_eq!(h.send(end()), SessionState::Completed);
        assert_eq!(h.session.active_workers(), 0);
        assert_eq!(h.subscription.closes, 1);
        assert_eq!(h.events.0.lock().unwrap().finished, 1);
        assert!(h.session.error().is_none());
    }

    #[test]
    fn test_unbalanced_end_still_closes() {
        let mut h = Harness::new();
        h.send(start());
        h.send(end());
        assert_eq!(h.session.state(), SessionState::Completed);

        // A late extra end is ignored once closed.
        h.send(end());
        assert_eq!(h.session.active_workers(), 0);
        assert_eq!(h.subscription.closes, 1);
        assert_eq!(h.events.0.lock().unwrap().finished, 1);
    }

    #[test]
    fn test_end_without_start_goes_negative() {
        let mut h = Harness::new();
        assert_eq!(h.send(end()), SessionState::Completed);
        assert_eq!(h.session.active_workers(), -1);
    }

    #[test]
    fn test_schema_and_records_emitted_in_order() {
        let mut h = Harness::new();
        h.send(start());
        h.send(json!({"type": "dump.forecast", "dataset": "Default", "body": {"nMessages": 4}}));
        h.send(json!({"type": "dump.table", "dataset": "Default",
                      "body": {"name": "Memos", "type": "Hash", "keyType": "ShortText"}}));
        h.send(json!({"type": "dump.column", "dataset": "Default",
                      "body": {"table": "Memos", "name": "title", "valueType": "Text", "type": "Scalar"}}));
        h.send(record(1));
        h.send(record(2));

        let names: Vec<_> = h.commands.iter().map(Command::name).collect();
        assert_eq!(names, ["table_create", "column_create", "add", "add"]);

        let Command::Add(first) = &h.commands[2] else {
            panic!("Expected add");
        };
        assert_eq!(first.get("inReplyTo"), None);
        assert_eq!(first["body"]["key"], 1);

        assert_eq!(h.session.progress().received(), 4);
        assert_eq!(h.session.progress().forecasted(), 4);
        assert_eq!(h.session.progress().percent_complete(), 100);
    }

    #[test]
    fn test_forecast_and_lifecycle_not_counted() {
        let mut h = Harness::new();
        h.send(start());
        h.send(json!({"type": "dump.forecast", "body": {"nMessages": 2}}));
        h.send(json!({"type": "dump.result", "statusCode": 200, "body": {}}));
        h.send(json!({"type": "dump.status", "body": {}}));
        assert_eq!(h.session.progress().received(), 0);
        assert!(h.commands.is_empty());
        assert!(h.session.is_active());
        assert_eq!(h.events.0.lock().unwrap().progress.len(), 4);
    }

    #[test]
    fn test_engine_error_closes_session() {
        let mut h = Harness::new();
        h.send(start());
        h.send(record(1));
        let state = h.send(json!({"type": "dump.result", "statusCode": 500,
                                  "body": {"name": "Error", "message": "boom"}}));
        assert_eq!(state, SessionState::Failed);
        assert_eq!(h.subscription.closes, 1);
        assert_eq!(h.session.error_message().as_deref(), Some("Error: boom"));

        // Nothing is emitted after the failure.
        h.send(record(2));
        h.send(end());
        assert_eq!(h.commands.len(), 1);
        assert_eq!(h.session.state(), SessionState::Failed);
        assert_eq!(h.events.0.lock().unwrap().errors.len(), 1);
        assert_eq!(h.events.0.lock().unwrap().finished, 0);
    }

    #[test]
    fn test_dump_error_message() {
        let mut h = Harness::new();
        h.send(json!({"type": "dump.error", "statusCode": 404,
                      "body": {"name": "NotFound", "message": "no such dataset"}}));
        assert_eq!(
            h.session.error(),
            Some(&DumpError::Engine {
                status_code: 404,
                name: "NotFound".to_string(),
                message: "no such dataset".to_string(),
            })
        );
    }

    #[test]
    fn test_first_error_wins() {
        let mut h = Harness::new();
        h.feed(Some(Inbound::Fault(TransportFault::new("socket closed"))));
        h.feed(None);
        h.send(json!("garbage"));
        assert_eq!(h.session.error_message().as_deref(), Some("socket closed"));
        assert_eq!(h.events.0.lock().unwrap().errors.len(), 1);
        assert_eq!(h.subscription.closes, 1);
    }

    #[test]
    fn test_absent_message_fails() {
        let mut h = Harness::new();
        h.send(start());
        assert_eq!(h.feed(None), SessionState::Failed);
        assert_eq!(h.session.error(), Some(&DumpError::NilMessage));
        assert_eq!(
            h.session.outcome(),
            Some(Err(DumpError::NilMessage))
        );
    }

    #[test]
    fn test_malformed_message_fails() {
        let mut h = Harness::new();
        assert_eq!(h.send(json!([1, 2, 3])), SessionState::Failed);
        assert!(h.session.error().unwrap().is_protocol_violation());
        // Malformed payloads are not reported as progress.
        assert!(h.events.0.lock().unwrap().progress.is_empty());
    }

    #[test]
    fn test_sink_failure_fails_session() {
        let mut session = DumpSession::new("Default", 10000);
        session.activate();
        let mut subscription = CountingSubscription::default();
        let mut emit = |_command: Command| -> anyhow::Result<()> { anyhow::bail!("broken pipe") };

        session.handle(Some(Inbound::Payload(record(1))), &mut subscription, &mut emit);
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(
            session.error_message().as_deref(),
            Some("failed to emit command: broken pipe")
        );
        assert_eq!(subscription.closes, 1);
    }

    #[test]
    fn test_outcome_summary() {
        let mut h = Harness::new();
        assert_eq!(h.session.outcome(), None);
        h.send(start());
        h.send(json!({"type": "dump.forecast", "body": {"nMessages": 1}}));
        h.send(record(1));
        h.send(end());
        assert_eq!(
            h.session.outcome(),
            Some(Ok(DumpSummary {
                forecasted: 1,
                received: 1
            }))
        );
    }
}

//! Dump session protocol.
//!
//! ```text
//! +-----------+     +------------+     +-------------+     +--------+
//! | Transport | --> | Classifier | --> | Translators | --> |  sink  |
//! +-----------+     +------------+     +-------------+     +--------+
//!                         |
//!                         v
//!                 Session / Progress
//! ```
//!
//! The transport delivers decoded `dump.*` messages. The session classifies
//! each one, keeps the worker counter and progress estimator up to date, and
//! forwards translated `table_create` / `column_create` / `add` commands to the
//! caller in arrival order.

pub mod client;
pub mod command;
pub mod message;
pub mod progress;
pub mod session;
pub mod translate;

pub use client::DumpClient;
pub use command::{ColumnCreate, Command, Flags, TableCreate};
pub use message::{
    classify, DumpMessage, DumpRequest, MessageKind, DEFAULT_MESSAGES_PER_SECOND,
};
pub use progress::{format_hms, ProgressEstimator, ProgressReport, MIN_REPORTED_THROUGHPUT};
pub use session::{DumpObserver, DumpSession, DumpSummary, NoopObserver, SessionState};
pub use translate::{translate_column, translate_record, translate_table};

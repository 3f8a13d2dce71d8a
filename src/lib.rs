//! drndump - streaming dump client for Droonga clusters.
//!
//! Subscribes to a cluster-wide `dump` operation, translates the stream of
//! `dump.*` messages produced by the cluster's dump workers into Groonga
//! commands (`table_create`, `column_create`, `add`) and tracks progress
//! toward completion.
//!
//! ```no_run
//! use drndump::dump::{DumpClient, DumpSession};
//! use drndump::transport::FrameTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = FrameTransport::connect("localhost", 10031).await?;
//! let mut client = DumpClient::new(transport, DumpSession::new("Default", 10000));
//! client
//!     .run(|command| {
//!         println!("{}", serde_json::to_string(&command)?);
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod dump;
pub mod error;
pub mod transport;

pub use error::{DumpError, Result};

//! # sigprobe - Connectivity verification for WebSocket signalling servers
//!
//! `sigprobe` opens one WebSocket connection per client role of a streaming
//! topology (streamer, player, SFU), sends a liveness message, lingers, closes
//! and reports what happened.
//!
//! ## Features
//!
//! - **Sequential runs** over a built-in or TOML-loaded registry
//! - **Exactly one outcome** per connection: connected and closed, failed or
//!   timed out
//! - **RFC 6455 client** with masked frames, ping answering and a bounded
//!   close handshake
//! - **Pluggable reporting** with a console transcript by default
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sigprobe::{Config, ConsoleReporter, Registry, TestRunner};
//!
//! # async fn run() {
//! let runner = TestRunner::new(Config::default(), Arc::new(ConsoleReporter::stdout()));
//! let report = runner.run(&Registry::default()).await;
//! assert_eq!(report.len(), 3);
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod liveness;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod report;
pub mod runner;
pub mod verifier;

pub use codec::WebSocketCodec;
pub use config::{Config, Limits, Timeouts};
pub use connection::{Connection, ConnectionState, connect};
pub use endpoint::{Endpoint, RoleAttributes, RoleKind};
pub use error::{Error, Result};
pub use liveness::LivenessMessage;
pub use message::{CloseCode, CloseFrame, Message};
pub use registry::{ConnectionDescriptor, Registry};
pub use report::{ConsoleReporter, RecordingReporter, ReportEvent, Reporter};
pub use runner::{RunReport, TestRunner};
pub use verifier::{ConnectionOutcome, Lifecycle, Verifier};

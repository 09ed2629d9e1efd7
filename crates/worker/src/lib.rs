//! Background worker that drains pending onboarding events.
//!
//! - [`Dispatcher`]: claim, deliver, and settle one event at a time.
//! - [`DeadLetterArchiver`]: moves exhausted or malformed events into the
//!   dead-letter sink.
//! - [`WorkerConfig`]: environment-driven settings for the binary.

pub mod archiver;
pub mod config;
pub mod dispatcher;

pub use archiver::{ArchiveError, DeadLetterArchiver};
pub use config::{ConfigError, WorkerConfig};
pub use dispatcher::{Dispatcher, DispatcherConfig, Outcome, Tick};

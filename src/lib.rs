//! Job dispatch and monitoring for a fleet of remote agents
//!
//! - [`queue`]: durable job queue over a pluggable store
//! - [`agents`]: agent registry and command dispatch
//! - [`monitoring`]: per-agent polling, metric series, thresholds
//! - [`alerts`]: alert storage and notifier fan-out
//! - [`coordinator`]: facade wiring all of the above from a [`config::Config`]

pub mod agents;
pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod monitoring;
pub mod queue;
pub mod util;

pub use coordinator::Coordinator;
pub use error::{Error, Result};

//! # Alfen Wallbox - session-aware device API poller
//!
//! A client for the HTTPS API of Alfen EV wallboxes. The device accepts one
//! authenticated connection at a time and drops it after writes, so the crate
//! is built around a single serialized request stream per wallbox.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: Structured logging and tracing
//! - `transport`: One HTTP connection to the device
//! - `session`: Authentication state and login rate limiting
//! - `driver`: Request executor, update cycle and poller
//! - `store`: Property store and pending-write queue
//! - `rotation`: Round-robin category scheduling
//! - `logparse`: Device log parsing into tag facts
//! - `transactions`: Transaction stream scanner
//! - `tags`: Per-socket charging session facts
//! - `diagnostics`: Redacted state dumps

pub mod api;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod logging;
pub mod logparse;
pub mod rotation;
pub mod session;
pub mod store;
pub mod tags;
pub mod transactions;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use driver::{AlfenDevice, Poller};
pub use error::{Result, WallboxError};

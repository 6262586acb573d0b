//! termlink-core: display model and shared types for termlink.
//!
//! This crate provides:
//! - The screen buffer, escape-sequence interpreter and display engine
//! - Versioned state synchronization with long-poll waiters
//! - Error taxonomy with transient/fatal classification
//! - Reconnection backoff policy
//! - Client configuration and logging setup

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod session;
pub mod sync;
pub mod terminal;

pub use config::ClientConfig;
pub use error::{Error, FailureKind, Result};
pub use logging::{LogFormat, init_logging};

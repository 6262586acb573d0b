//! Session lifecycle helpers shared by client implementations.
//!
//! This module provides:
//! - Exponential reconnection backoff as a pure policy
//! - An injectable sleep capability so retry loops are testable

mod reconnect;

pub use reconnect::{ReconnectPolicy, Sleeper, TokioSleeper};

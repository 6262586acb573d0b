//! termlink-client: remote terminal sessions over SSH.
//!
//! Provides:
//! - The display contract and an engine-backed headless display
//! - Password, key file and agent credentials
//! - The transport contract and its russh implementation
//! - The session manager with keepalive and automatic reconnection
//! - A long-poll service for browser consumers

pub mod auth;
pub mod client;
pub mod display;
pub mod ssh;
pub mod transport;
pub mod view;
pub mod web;

pub use auth::{AgentCredential, AuthMaterial, Credential, KeyCredential, PasswordCredential};
pub use client::{SessionManager, SessionPhase};
pub use display::{Display, ViewOptions};
pub use ssh::{AcceptAnyHostKey, HostKeyVerifier, KnownHostsVerifier, SshConnector};
pub use transport::{
    Connector, Endpoint, RemoteSession, ShellControl, ShellIo, ShellReader, Transport,
};
pub use view::EngineView;
pub use web::{InputEvent, PollService};

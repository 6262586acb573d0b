//! Transport contract.
//!
//! A [`Connector`] dials and authenticates, yielding a multiplexed
//! [`Transport`]. Each session attempt opens one [`RemoteSession`] on it,
//! requests a PTY and starts a shell, after which the shell is driven through
//! a [`ShellReader`] (remote output) and a shared [`ShellControl`] (input and
//! window changes).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use termlink_core::Result;
use termlink_core::config::ClientConfig;

use crate::auth::AuthMaterial;

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Bound on TCP dial plus handshake.
    pub connect_timeout: Duration,
}

impl Endpoint {
    /// Endpoint for `host:port` using the user and timeout from `config`.
    pub fn new(host: impl Into<String>, port: u16, config: &ClientConfig) -> Self {
        Self {
            host: host.into(),
            port,
            user: config.user.clone(),
            connect_timeout: config.connect_timeout,
        }
    }

    /// `host:port`, suitable for dialing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Dials and authenticates transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint, auth: AuthMaterial) -> Result<Arc<dyn Transport>>;
}

/// An authenticated, multiplexed connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a fresh command channel.
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>>;

    /// Send one keepalive request and wait for the reply.
    async fn keepalive(&self) -> Result<()>;

    /// Tear the connection down. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// A command channel that has not started its shell yet.
#[async_trait]
pub trait RemoteSession: Send {
    /// Allocate a remote PTY.
    async fn request_pty(&mut self, term: &str, width: u16, height: u16) -> Result<()>;

    /// Resize the PTY. Fails with `NoPty` before [`request_pty`](Self::request_pty).
    async fn window_change(&mut self, width: u16, height: u16) -> Result<()>;

    /// Start an interactive shell, consuming the setup handle.
    async fn start_shell(self: Box<Self>) -> Result<ShellIo>;
}

/// Handles to a running shell.
pub struct ShellIo {
    pub reader: Box<dyn ShellReader>,
    pub control: Arc<dyn ShellControl>,
}

/// Remote output stream.
#[async_trait]
pub trait ShellReader: Send {
    /// Next chunk of output. `Ok(None)` is a clean end of stream.
    async fn read(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Input and resize side of a running shell.
#[async_trait]
pub trait ShellControl: Send + Sync {
    async fn write(&self, data: &[u8]) -> Result<()>;

    /// Resize the PTY. Fails with `NoPty` if the shell runs without one.
    async fn window_change(&self, width: u16, height: u16) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================

//! SSH transport.
//!
//! Dials the server with a bounded timeout, verifies its host key through a
//! pluggable [`HostKeyVerifier`], authenticates with the resolved
//! [`AuthMaterial`] and exposes the connection as a [`Transport`].
//!
//! Once the shell starts, the channel is owned by a single pump task. Output
//! flows to the [`ShellReader`] over a queue; writes and window changes reach
//! the pump as commands carrying a reply slot.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use russh::client;
use russh::{Channel, ChannelMsg};
use russh_keys::key::PublicKey;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use termlink_core::{Error, Result};

use crate::auth::AuthMaterial;
use crate::transport::{
    Connector, Endpoint, RemoteSession, ShellControl, ShellIo, ShellReader, Transport,
};

/// Depth of the pump's output and command queues.
const PUMP_QUEUE_DEPTH: usize = 64;

/// Decides whether a server's host key is trusted.
pub trait HostKeyVerifier: Send + Sync + 'static {
    fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<bool>;
}

/// Checks host keys against an OpenSSH `known_hosts` file.
#[derive(Debug, Clone, Default)]
pub struct KnownHostsVerifier {
    /// Defaults to `~/.ssh/known_hosts`.
    path: Option<PathBuf>,
}

impl KnownHostsVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific known_hosts file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl HostKeyVerifier for KnownHostsVerifier {
    fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<bool> {
        let checked = match &self.path {
            Some(path) => russh_keys::check_known_hosts_path(host, port, key, path),
            None => russh_keys::check_known_hosts(host, port, key),
        };
        match checked {
            Ok(known) => {
                if !known {
                    warn!(host, port, fingerprint = %key.fingerprint(), "Host key not in known_hosts");
                }
                Ok(known)
            }
            Err(russh_keys::Error::KeyChanged { line }) => {
                warn!(host, port, line, "Host key changed");
                Ok(false)
            }
            Err(e) => Err(Error::transport(format!("known_hosts check failed: {}", e))),
        }
    }
}

/// Trusts every host key. Only for tests and trusted networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyHostKey;

impl HostKeyVerifier for AcceptAnyHostKey {
    fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<bool> {
        warn!(host, port, fingerprint = %key.fingerprint(), "Skipping SSH host key verification (insecure)");
        Ok(true)
    }
}

/// SSH client handler.
struct SshHandler {
    host: String,
    port: u16,
    verifier: Arc<dyn HostKeyVerifier>,
}

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self
            .verifier
            .verify(&self.host, self.port, server_public_key)
        {
            Ok(trusted) => Ok(trusted),
            Err(e) => {
                warn!(error = %e, "Host key verification failed");
                Ok(false)
            }
        }
    }
}

/// [`Connector`] over SSH.
#[derive(Clone)]
pub struct SshConnector {
    verifier: Arc<dyn HostKeyVerifier>,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(KnownHostsVerifier::default())
    }
}

impl SshConnector {
    pub fn new(verifier: impl HostKeyVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, endpoint: &Endpoint, auth: AuthMaterial) -> Result<Arc<dyn Transport>> {
        let addr = endpoint.address();
        info!(addr = %addr, user = %endpoint.user, method = auth.method(), "Connecting via SSH");

        // Keepalives are driven by the session manager.
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });
        let handler = SshHandler {
            host: endpoint.host.clone(),
            port: endpoint.port,
            verifier: Arc::clone(&self.verifier),
        };

        let mut handle = tokio::time::timeout(
            endpoint.connect_timeout,
            client::connect(ssh_config, addr.as_str(), handler),
        )
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|e| Error::transport(format!("SSH connection failed: {}", e)))?;

        debug!("SSH connection established");

        let authenticated = match auth {
            AuthMaterial::Password(password) => handle
                .authenticate_password(&endpoint.user, password)
                .await
                .map_err(|e| Error::transport(format!("password auth failed: {}", e)))?,
            AuthMaterial::KeyPair(key_pair) => handle
                .authenticate_publickey(&endpoint.user, key_pair)
                .await
                .map_err(|e| Error::transport(format!("public key auth failed: {}", e)))?,
            AuthMaterial::Agent { socket } => {
                authenticate_with_agent(&mut handle, &endpoint.user, &socket).await?
            }
        };

        if !authenticated {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await;
            return Err(Error::AuthenticationFailed);
        }

        info!(addr = %addr, "SSH authentication successful");

        Ok(Arc::new(SshTransport {
            handle,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Try every identity the agent offers until one is accepted.
#[cfg(unix)]
async fn authenticate_with_agent(
    handle: &mut client::Handle<SshHandler>,
    user: &str,
    socket: &Path,
) -> Result<bool> {
    use russh_keys::agent::client::AgentClient;

    debug!(socket = %socket.display(), "Attempting SSH agent authentication");
    let mut agent = AgentClient::connect_uds(socket).await.map_err(|e| Error::Credential {
        name: "agent".to_string(),
        message: format!("failed to connect to agent: {}", e),
    })?;
    let identities = agent.request_identities().await.map_err(|e| Error::Credential {
        name: "agent".to_string(),
        message: format!("failed to list agent identities: {}", e),
    })?;

    for key in identities {
        let fingerprint = key.fingerprint();
        let (returned, result) = handle.authenticate_future(user, key, agent).await;
        agent = returned;
        match result {
            Ok(true) => return Ok(true),
            Ok(false) => debug!(%fingerprint, "Agent identity rejected"),
            Err(e) => warn!(%fingerprint, error = ?e, "Agent signing failed"),
        }
    }
    Ok(false)
}

#[cfg(not(unix))]
async fn authenticate_with_agent(
    _handle: &mut client::Handle<SshHandler>,
    _user: &str,
    _socket: &Path,
) -> Result<bool> {
    Err(Error::Credential {
        name: "agent".to_string(),
        message: "agent authentication requires a unix socket".to_string(),
    })
}

/// An authenticated SSH connection.
pub struct SshTransport {
    handle: client::Handle<SshHandler>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for SshTransport {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed);
        }
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::transport(format!("failed to open SSH channel: {}", e)))?;
        Ok(Box::new(SshRemoteSession {
            channel,
            pty: false,
        }))
    }

    async fn keepalive(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || self.handle.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.handle
            .send_keepalive(true)
            .await
            .map_err(|e| Error::transport(format!("keepalive failed: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("Closing SSH connection");
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await;
        Ok(())
    }
}

/// Wait for the reply to a request sent with `want_reply`.
async fn await_reply(channel: &mut Channel<client::Msg>, request: &str) -> Result<()> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(Error::Protocol {
                    message: format!("server refused {} request", request),
                });
            }
            Some(_) => continue,
            None => return Err(Error::ConnectionClosed),
        }
    }
}

struct SshRemoteSession {
    channel: Channel<client::Msg>,
    pty: bool,
}

#[async_trait]
impl RemoteSession for SshRemoteSession {
    async fn request_pty(&mut self, term: &str, width: u16, height: u16) -> Result<()> {
        self.channel
            .request_pty(true, term, u32::from(width), u32::from(height), 0, 0, &[])
            .await
            .map_err(|e| Error::transport(format!("failed to request PTY: {}", e)))?;
        await_reply(&mut self.channel, "pty-req").await?;
        self.pty = true;
        debug!(term, width, height, "PTY allocated");
        Ok(())
    }

    async fn window_change(&mut self, width: u16, height: u16) -> Result<()> {
        if !self.pty {
            return Err(Error::NoPty);
        }
        self.channel
            .window_change(u32::from(width), u32::from(height), 0, 0)
            .await
            .map_err(|e| Error::transport(format!("window change failed: {}", e)))
    }

    async fn start_shell(self: Box<Self>) -> Result<ShellIo> {
        let SshRemoteSession { mut channel, pty } = *self;
        channel
            .request_shell(true)
            .await
            .map_err(|e| Error::transport(format!("failed to start shell: {}", e)))?;
        await_reply(&mut channel, "shell").await?;

        let (output_tx, output_rx) = mpsc::channel(PUMP_QUEUE_DEPTH);
        let (command_tx, command_rx) = mpsc::channel(PUMP_QUEUE_DEPTH);
        tokio::spawn(pump_channel(channel, command_rx, output_tx));

        Ok(ShellIo {
            reader: Box::new(SshShellReader { output: output_rx }),
            control: Arc::new(SshShellControl {
                commands: command_tx,
                pty,
            }),
        })
    }
}

enum ShellCommand {
    Write {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    Resize {
        width: u16,
        height: u16,
        reply: oneshot::Sender<Result<()>>,
    },
}

type Output = Result<Option<Vec<u8>>>;

/// Own the channel: forward remote output and apply local commands.
async fn pump_channel(
    mut channel: Channel<client::Msg>,
    mut commands: mpsc::Receiver<ShellCommand>,
    output: mpsc::Sender<Output>,
) {
    // End of stream already delivered to the reader.
    let mut finished = false;
    let mut exited = false;

    loop {
        tokio::select! {
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    if output.send(Ok(Some(data.to_vec()))).await.is_err() {
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!(exit_status, "Remote shell exited");
                    exited = true;
                }
                Some(ChannelMsg::Eof) => {
                    if !finished {
                        finished = true;
                        let _ = output.send(Ok(None)).await;
                    }
                }
                Some(ChannelMsg::Close) => {
                    if !finished {
                        let _ = output.send(Ok(None)).await;
                    }
                    break;
                }
                None => {
                    // Without an exit status the connection went away under us.
                    if !finished {
                        let end = if exited { Ok(None) } else { Err(Error::ConnectionClosed) };
                        let _ = output.send(end).await;
                    }
                    break;
                }
                Some(_) => {}
            },
            command = commands.recv() => match command {
                Some(ShellCommand::Write { data, reply }) => {
                    let result = channel
                        .data(&data[..])
                        .await
                        .map_err(|e| Error::transport(format!("channel write failed: {}", e)));
                    let _ = reply.send(result);
                }
                Some(ShellCommand::Resize { width, height, reply }) => {
                    let result = channel
                        .window_change(u32::from(width), u32::from(height), 0, 0)
                        .await
                        .map_err(|e| Error::transport(format!("window change failed: {}", e)));
                    let _ = reply.send(result);
                }
                None => {
                    let _ = channel.close().await;
                    break;
                }
            },
        }
    }
    debug!("Channel pump exited");
}

struct SshShellReader {
    output: mpsc::Receiver<Output>,
}

#[async_trait]
impl ShellReader for SshShellReader {
    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        self.output.recv().await.unwrap_or(Ok(None))
    }
}

struct SshShellControl {
    commands: mpsc::Sender<ShellCommand>,
    pty: bool,
}

impl SshShellControl {
    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<()>>) -> ShellCommand,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        response.await.map_err(|_| Error::ConnectionClosed)?
    }
}

#[async_trait]
impl ShellControl for SshShellControl {
    async fn write(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let data = data.to_vec();
        self.request(|reply| ShellCommand::Write { data, reply })
            .await
    }

    async fn window_change(&self, width: u16, height: u16) -> Result<()> {
        if !self.pty {
            return Err(Error::NoPty);
        }
        self.request(|reply| ShellCommand::Resize {
            width,
            height,
            reply,
        })
        .await
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Mock transport for testing without a real network.
//!
//! [`MockConnector`] hands out in-memory transports and can be scripted to
//! fail a number of connects first. Every shell started on one of its
//! transports is published as a [`MockShell`], the remote end a test drives
//! directly: push output, read the input the client wrote, observe window
//! changes or break the stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use termlink_client::{
    AuthMaterial, Connector, Endpoint, RemoteSession, ShellControl, ShellIo, ShellReader, Transport,
};
use termlink_core::{Error, Result};

type Output = Result<Option<Vec<u8>>>;

#[derive(Default)]
struct ConnectorState {
    failures: Mutex<VecDeque<String>>,
    attempts: AtomicUsize,
    endpoints: Mutex<Vec<Endpoint>>,
    methods: Mutex<Vec<&'static str>>,
    transports: Mutex<Vec<Arc<MockTransport>>>,
}

/// Connector producing in-memory transports.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<ConnectorState>,
    shells_tx: mpsc::UnboundedSender<MockShell>,
    shells_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<MockShell>>>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        let (shells_tx, shells_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(ConnectorState::default()),
            shells_tx,
            shells_rx: Arc::new(tokio::sync::Mutex::new(shells_rx)),
        }
    }

    /// Fail the next `count` connects with a transport error carrying `message`.
    pub fn fail_next(&self, count: usize, message: &str) {
        let mut failures = self.state.failures.lock().unwrap();
        failures.extend(std::iter::repeat_n(message.to_string(), count));
    }

    /// Connect attempts so far, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Endpoints of every attempt, in order.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.state.endpoints.lock().unwrap().clone()
    }

    /// Authentication method of every attempt, in order.
    pub fn auth_methods(&self) -> Vec<&'static str> {
        self.state.methods.lock().unwrap().clone()
    }

    /// Transports handed out so far.
    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.state.transports.lock().unwrap().clone()
    }

    /// Most recently handed out transport.
    pub fn last_transport(&self) -> Option<Arc<MockTransport>> {
        self.state.transports.lock().unwrap().last().cloned()
    }

    /// Wait for the next shell started on any of this connector's transports.
    pub async fn next_shell(&self) -> MockShell {
        self.shells_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped while waiting for a shell")
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &Endpoint, auth: AuthMaterial) -> Result<Arc<dyn Transport>> {
        let attempt = self.state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.endpoints.lock().unwrap().push(endpoint.clone());
        self.state.methods.lock().unwrap().push(auth.method());

        let failure = self.state.failures.lock().unwrap().pop_front();
        if let Some(message) = failure {
            debug!(attempt, %message, "Mock connect failing");
            return Err(Error::transport(message));
        }

        let transport = Arc::new(MockTransport::new(self.shells_tx.clone()));
        self.state
            .transports
            .lock()
            .unwrap()
            .push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// In-memory transport.
pub struct MockTransport {
    shells: mpsc::UnboundedSender<MockShell>,
    closed: AtomicBool,
    sessions: AtomicUsize,
    keepalives: AtomicUsize,
    fail_keepalive: AtomicBool,
}

impl MockTransport {
    fn new(shells: mpsc::UnboundedSender<MockShell>) -> Self {
        Self {
            shells,
            closed: AtomicBool::new(false),
            sessions: AtomicUsize::new(0),
            keepalives: AtomicUsize::new(0),
            fail_keepalive: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn keepalive_count(&self) -> usize {
        self.keepalives.load(Ordering::SeqCst)
    }

    /// Make every following keepalive fail.
    pub fn fail_keepalives(&self) {
        self.fail_keepalive.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockRemoteSession {
            shells: self.shells.clone(),
            pty: None,
        }))
    }

    async fn keepalive(&self) -> Result<()> {
        self.keepalives.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        if self.fail_keepalive.load(Ordering::SeqCst) {
            return Err(Error::transport("keepalive failed: connection reset by peer"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockRemoteSession {
    shells: mpsc::UnboundedSender<MockShell>,
    pty: Option<(String, u16, u16)>,
}

#[async_trait]
impl RemoteSession for MockRemoteSession {
    async fn request_pty(&mut self, term: &str, width: u16, height: u16) -> Result<()> {
        self.pty = Some((term.to_string(), width, height));
        Ok(())
    }

    async fn window_change(&mut self, width: u16, height: u16) -> Result<()> {
        match &mut self.pty {
            Some((_, w, h)) => {
                *w = width;
                *h = height;
                Ok(())
            }
            None => Err(Error::NoPty),
        }
    }

    async fn start_shell(self: Box<Self>) -> Result<ShellIo> {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (resize_tx, resize_rx) = mpsc::unbounded_channel();
        let write_failure = Arc::new(Mutex::new(None));

        let shell = MockShell {
            pty: self.pty.clone(),
            output: output_tx,
            input: input_rx,
            resizes: resize_rx,
            write_failure: Arc::clone(&write_failure),
        };
        self.shells
            .send(shell)
            .map_err(|_| Error::transport("mock connector dropped"))?;

        Ok(ShellIo {
            reader: Box::new(MockShellReader { output: output_rx }),
            control: Arc::new(MockShellControl {
                input: input_tx,
                resizes: resize_tx,
                pty: self.pty.is_some(),
                write_failure,
            }),
        })
    }
}

struct MockShellReader {
    output: mpsc::UnboundedReceiver<Output>,
}

#[async_trait]
impl ShellReader for MockShellReader {
    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        // Dropping the MockShell hangs up cleanly.
        self.output.recv().await.unwrap_or(Ok(None))
    }
}

struct MockShellControl {
    input: mpsc::UnboundedSender<Vec<u8>>,
    resizes: mpsc::UnboundedSender<(u16, u16)>,
    pty: bool,
    write_failure: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl ShellControl for MockShellControl {
    async fn write(&self, data: &[u8]) -> Result<()> {
        if let Some(message) = self.write_failure.lock().unwrap().clone() {
            return Err(Error::transport(message));
        }
        self.input
            .send(data.to_vec())
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn window_change(&self, width: u16, height: u16) -> Result<()> {
        if !self.pty {
            return Err(Error::NoPty);
        }
        self.resizes
            .send((width, height))
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// Remote end of a started shell.
pub struct MockShell {
    pty: Option<(String, u16, u16)>,
    output: mpsc::UnboundedSender<Output>,
    input: mpsc::UnboundedReceiver<Vec<u8>>,
    resizes: mpsc::UnboundedReceiver<(u16, u16)>,
    write_failure: Arc<Mutex<Option<String>>>,
}

impl MockShell {
    /// Terminal type and size of the PTY requested before the shell started.
    pub fn pty(&self) -> Option<(&str, u16, u16)> {
        self.pty.as_ref().map(|(term, w, h)| (term.as_str(), *w, *h))
    }

    /// Emit remote output.
    pub fn send_output(&self, data: &[u8]) {
        let _ = self.output.send(Ok(Some(data.to_vec())));
    }

    /// End the output stream cleanly.
    pub fn finish(&self) {
        let _ = self.output.send(Ok(None));
    }

    /// Break the output stream with a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self.output.send(Err(Error::transport(message)));
    }

    /// Make writes from the client fail with a transport error.
    pub fn fail_writes(&self, message: &str) {
        *self.write_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Next chunk the client wrote, or `None` once the client side is gone.
    pub async fn recv_input(&mut self) -> Option<Vec<u8>> {
        self.input.recv().await
    }

    /// Next window change the client issued.
    pub async fn recv_resize(&mut self) -> Option<(u16, u16)> {
        self.resizes.recv().await
    }
}

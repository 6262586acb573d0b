//! Session manager.
//!
//! Owns the connection to the remote host and drives interactive sessions
//! over it. A session attempt opens a channel, requests a PTY sized to the
//! attached display and starts a shell, then runs three tasks until the first
//! of them reports:
//!
//! - the output pump renders remote output on the display,
//! - the input pump forwards the display's input to the shell,
//! - the resize monitor propagates display size changes to the PTY.
//!
//! Transient transport failures are recovered by reconnecting with
//! exponential backoff and starting a fresh attempt. Fatal failures and
//! cancellation end [`SessionManager::run`].

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use termlink_core::config::ClientConfig;
use termlink_core::constants::{COMPLETION_QUEUE_DEPTH, KEEPALIVE_ERROR_QUEUE_DEPTH};
use termlink_core::session::{ReconnectPolicy, Sleeper, TokioSleeper};
use termlink_core::{Error, FailureKind, Result};

use crate::auth::{AgentCredential, Credential};
use crate::display::Display;
use crate::transport::{Connector, Endpoint, ShellControl, ShellIo, ShellReader, Transport};

/// Lifecycle phase of a [`SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No transport.
    Disconnected,
    /// Transport established, no session running.
    Connected,
    /// A shell session is running.
    Active,
    /// Replacing a failed transport.
    Reconnecting,
}

/// A live transport and the keepalive task bound to it.
struct Link {
    transport: Arc<dyn Transport>,
    keepalive: CancellationToken,
}

struct SessionState {
    phase: SessionPhase,
    host: String,
    port: u16,
    link: Option<Link>,
    last_credential: Option<Arc<dyn Credential>>,
}

impl SessionState {
    /// Drop the current transport, stopping its keepalive. Idempotent.
    async fn release(&mut self) -> Result<()> {
        self.phase = SessionPhase::Disconnected;
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        link.keepalive.cancel();
        let result = link.transport.close().await;
        info!(host = %self.host, port = self.port, "Disconnected");
        result
    }
}

/// Why a reconnection loop gave up.
enum ReconnectFailure {
    Cancelled,
    Exhausted { attempts: u32, last: Error },
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Connection supervisor for one remote host.
pub struct SessionManager<C: Connector> {
    config: ClientConfig,
    policy: ReconnectPolicy,
    connector: C,
    state: Mutex<SessionState>,
    display: Option<Arc<dyn Display>>,
    /// Size of the PTY as last requested or changed.
    pty_size: Arc<StdMutex<Option<(u16, u16)>>>,
    fallback_credential: Option<Arc<dyn Credential>>,
    sleeper: Arc<dyn Sleeper>,
    errors_tx: mpsc::Sender<Error>,
    errors_rx: StdMutex<mpsc::Receiver<Error>>,
}

impl<C: Connector> SessionManager<C> {
    /// Create a manager. The SSH agent from the environment, if any, becomes
    /// the fallback credential for reconnection.
    pub fn new(config: ClientConfig, connector: C) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(KEEPALIVE_ERROR_QUEUE_DEPTH);
        let agent = AgentCredential::from_env();
        let fallback_credential: Option<Arc<dyn Credential>> = if agent.is_available() {
            Some(Arc::new(agent))
        } else {
            None
        };

        Self {
            policy: config.reconnect_policy(),
            config,
            connector,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Disconnected,
                host: String::new(),
                port: 0,
                link: None,
                last_credential: None,
            }),
            display: None,
            pty_size: Arc::new(StdMutex::new(None)),
            fallback_credential,
            sleeper: Arc::new(TokioSleeper),
            errors_tx,
            errors_rx: StdMutex::new(errors_rx),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Attach a display, closing the previous one. The display is
    /// initialized before it is installed.
    pub async fn set_display(&mut self, display: Arc<dyn Display>) -> Result<()> {
        if let Some(previous) = self.display.take()
            && let Err(e) = previous.close().await
        {
            warn!(error = %e, "Failed to close previous display");
        }
        display.init().await?;
        self.display = Some(display);
        Ok(())
    }

    /// Credential used to reconnect when none was used before.
    pub fn set_fallback_credential(&mut self, credential: Option<Arc<dyn Credential>>) {
        self.fallback_credential = credential;
    }

    /// Replace the sleep used between reconnection attempts.
    pub fn set_sleeper(&mut self, sleeper: Arc<dyn Sleeper>) {
        self.sleeper = sleeper;
    }

    /// Connect to `host:port`, replacing any existing connection.
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        credential: Arc<dyn Credential>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Err(e) = state.release().await {
            debug!(error = %e, "Error closing previous connection");
        }

        let auth = credential.resolve().await.map_err(|e| match e {
            Error::Credential { .. } => e,
            other => Error::Credential {
                name: credential.name().to_string(),
                message: other.to_string(),
            },
        })?;

        let endpoint = Endpoint::new(host, port, &self.config);
        let transport = self
            .connector
            .connect(&endpoint, auth)
            .await
            .map_err(|e| match e {
                Error::Connection { .. } | Error::Cancelled => e,
                other => Error::connection(host, port, other),
            })?;

        let keepalive = CancellationToken::new();
        tokio::spawn(keepalive_loop(
            Arc::clone(&transport),
            self.config.keepalive_interval,
            keepalive.clone(),
            self.errors_tx.clone(),
        ));

        state.link = Some(Link {
            transport,
            keepalive,
        });
        state.phase = SessionPhase::Connected;
        state.host = host.to_string();
        state.port = port;
        state.last_credential = Some(credential);
        info!(host, port, "Connected");
        Ok(())
    }

    /// Close the connection. Succeeds when already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        self.state.lock().await.release().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.link.is_some()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Current PTY dimensions, following window changes.
    pub async fn pty_size(&self) -> Option<(u16, u16)> {
        *lock(&self.pty_size)
    }

    /// Drain failures reported by the keepalive task.
    pub fn take_errors(&self) -> Vec<Error> {
        let mut errors = lock(&self.errors_rx);
        let mut drained = Vec::new();
        while let Ok(e) = errors.try_recv() {
            drained.push(e);
        }
        drained
    }

    /// Run interactive sessions until the remote side ends cleanly, a fatal
    /// error occurs, reconnection fails or `cancel` fires.
    ///
    /// Cancellation disconnects and returns [`Error::Cancelled`].
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.is_connected().await {
            return Err(Error::NotConnected);
        }
        let display = self.display.clone().ok_or(Error::DisplayNotSet)?;

        loop {
            let outcome = if cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                self.run_session(&display, cancel).await
            };

            let error = match outcome {
                Ok(()) => {
                    info!("Session ended");
                    let mut state = self.state.lock().await;
                    if state.link.is_some() {
                        state.phase = SessionPhase::Connected;
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            match error.classify() {
                FailureKind::Cancelled => {
                    debug!("Session cancelled");
                    if let Err(e) = self.disconnect().await {
                        debug!(error = %e, "Error closing connection after cancellation");
                    }
                    return Err(Error::Cancelled);
                }
                FailureKind::Fatal => {
                    warn!(error = %error, "Session failed");
                    if let Err(e) = self.disconnect().await {
                        debug!(error = %e, "Error closing connection after failure");
                    }
                    return Err(error);
                }
                FailureKind::Transient => {
                    warn!(error = %error, "Session interrupted, attempting reconnection");
                    self.resume(error, cancel).await?;
                    info!("Reconnection successful, resuming session");
                }
            }
        }
    }

    /// Reconnect to the last host. Unlike the automatic path this always
    /// makes at least one attempt, even with reconnection disabled.
    pub async fn reconnect(&self, credential: Option<Arc<dyn Credential>>) -> Result<()> {
        let credential = match credential {
            Some(credential) => credential,
            None => self.reconnect_credential().await?,
        };
        if self.state.lock().await.host.is_empty() {
            return Err(Error::NotConnected);
        }
        let attempts = self.policy.max_attempts().max(1);
        match self
            .reconnect_with(credential, attempts, &CancellationToken::new())
            .await
        {
            Ok(()) => Ok(()),
            Err(ReconnectFailure::Cancelled) => Err(Error::Cancelled),
            Err(ReconnectFailure::Exhausted { attempts, last }) => Err(Error::ReconnectFailed {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    /// Close the display and the connection.
    pub async fn close(&self) -> Result<()> {
        if let Some(display) = &self.display
            && let Err(e) = display.close().await
        {
            warn!(error = %e, "Failed to close display");
        }
        self.disconnect().await
    }

    /// Recover from a transient session failure.
    async fn resume(&self, cause: Error, cancel: &CancellationToken) -> Result<()> {
        if !self.policy.enabled() {
            if let Err(e) = self.disconnect().await {
                debug!(error = %e, "Error closing failed connection");
            }
            return Err(Error::ReconnectDisabled {
                cause: Box::new(cause),
            });
        }

        let credential = match self.reconnect_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                if let Err(close_err) = self.disconnect().await {
                    debug!(error = %close_err, "Error closing failed connection");
                }
                return Err(e);
            }
        };

        match self
            .reconnect_with(credential, self.policy.max_attempts(), cancel)
            .await
        {
            Ok(()) => Ok(()),
            Err(ReconnectFailure::Cancelled) => Err(Error::Cancelled),
            Err(ReconnectFailure::Exhausted { attempts, last }) => Err(Error::ReconnectExhausted {
                attempts,
                cause: Box::new(cause),
                last: Box::new(last),
            }),
        }
    }

    /// The last credential that connected, else the fallback.
    async fn reconnect_credential(&self) -> Result<Arc<dyn Credential>> {
        let last = self.state.lock().await.last_credential.clone();
        last.or_else(|| self.fallback_credential.clone())
            .ok_or(Error::NoCredential)
    }

    async fn reconnect_with(
        &self,
        credential: Arc<dyn Credential>,
        attempts: u32,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ReconnectFailure> {
        let (host, port) = {
            let mut state = self.state.lock().await;
            if let Err(e) = state.release().await {
                debug!(error = %e, "Error closing stale connection");
            }
            state.phase = SessionPhase::Reconnecting;
            (state.host.clone(), state.port)
        };
        info!(host = %host, port, attempts, "Reconnecting");

        let mut last = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                if cancel.is_cancelled() {
                    return Err(self.abandon_reconnect().await);
                }
                let delay = self.policy.delay(attempt - 1);
                info!(
                    attempt = attempt + 1,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Waiting before reconnection attempt"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(self.abandon_reconnect().await),
                    _ = self.sleeper.sleep(delay) => {}
                }
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(self.abandon_reconnect().await),
                result = self.connect(&host, port, Arc::clone(&credential)) => result,
            };
            match result {
                Ok(()) => {
                    info!(attempt = attempt + 1, "Reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, attempts, error = %e, "Reconnection attempt failed");
                    last = Some(e);
                }
            }
        }

        self.state.lock().await.phase = SessionPhase::Disconnected;
        Err(ReconnectFailure::Exhausted {
            attempts,
            last: last.unwrap_or(Error::NotConnected),
        })
    }

    async fn abandon_reconnect(&self) -> ReconnectFailure {
        debug!("Reconnection cancelled");
        self.state.lock().await.phase = SessionPhase::Disconnected;
        ReconnectFailure::Cancelled
    }

    /// One session attempt on the current transport.
    async fn run_session(
        &self,
        display: &Arc<dyn Display>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Captured once; a reconnect installs a new transport for the next attempt.
        let transport = {
            let mut state = self.state.lock().await;
            let transport = state
                .link
                .as_ref()
                .map(|link| Arc::clone(&link.transport))
                .ok_or(Error::NotConnected)?;
            state.phase = SessionPhase::Active;
            transport
        };

        let (width, height) = display.size();
        let setup = async {
            let mut session = transport.open_session().await?;
            session
                .request_pty(&self.config.default_terminal, width, height)
                .await?;
            session.start_shell().await
        };
        let ShellIo { reader, control } = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            io = setup => io?,
        };
        *lock(&self.pty_size) = Some((width, height));
        debug!(width, height, term = %self.config.default_terminal, "Shell started");

        let attempt = cancel.child_token();
        let (done_tx, mut done_rx) = mpsc::channel(COMPLETION_QUEUE_DEPTH);
        let mut tasks = JoinSet::new();
        tasks.spawn(pump_output(
            reader,
            Arc::clone(display),
            attempt.clone(),
            done_tx.clone(),
        ));
        tasks.spawn(pump_input(
            Arc::clone(display),
            Arc::clone(&control),
            attempt.clone(),
            done_tx,
        ));
        tasks.spawn(monitor_resize(
            Arc::clone(display),
            control,
            Arc::clone(&self.pty_size),
            self.config.resize_poll_interval,
            attempt.clone(),
        ));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            first = done_rx.recv() => first.unwrap_or(Ok(())),
        };
        attempt.cancel();
        tasks.shutdown().await;
        outcome
    }
}

/// Render remote output until end of stream.
async fn pump_output(
    mut reader: Box<dyn ShellReader>,
    display: Arc<dyn Display>,
    cancel: CancellationToken,
    done: mpsc::Sender<Result<()>>,
) {
    let result = loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return,
            chunk = reader.read() => chunk,
        };
        match chunk {
            Ok(Some(data)) => {
                if let Err(e) = display.render(&data).await {
                    break Err(e);
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    debug!(clean = result.is_ok(), "Output pump exited");
    let _ = done.send(result).await;
}

/// Forward display input to the shell. End of input stops only this task.
async fn pump_input(
    display: Arc<dyn Display>,
    control: Arc<dyn ShellControl>,
    cancel: CancellationToken,
    done: mpsc::Sender<Result<()>>,
) {
    loop {
        let input = tokio::select! {
            _ = cancel.cancelled() => return,
            input = display.handle_input() => input,
        };
        let result = match input {
            Ok(Some(bytes)) => control.write(&bytes).await,
            Ok(None) => {
                debug!("Input stream ended");
                return;
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!(error = %e, "Input pump exited");
            let _ = done.send(Err(e)).await;
            return;
        }
    }
}

/// Poll the display size and issue a window change when it moves.
async fn monitor_resize(
    display: Arc<dyn Display>,
    control: Arc<dyn ShellControl>,
    pty_size: Arc<StdMutex<Option<(u16, u16)>>>,
    period: Duration,
    cancel: CancellationToken,
) {
    if period.is_zero() {
        return;
    }
    let Some(mut last) = *lock(&pty_size) else {
        return;
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let (width, height) = display.size();
        if (width, height) == last || width == 0 || height == 0 {
            continue;
        }
        last = (width, height);
        match control.window_change(width, height).await {
            Ok(()) => {
                *lock(&pty_size) = Some((width, height));
                debug!(width, height, "Window size changed");
            }
            Err(e) => warn!(width, height, error = %e, "Window change failed"),
        }
    }
}

/// Probe the transport periodically. A failure is queued for
/// [`SessionManager::take_errors`] and ends the task; the session is left
/// to notice on its own.
async fn keepalive_loop(
    transport: Arc<dyn Transport>,
    interval: Duration,
    cancel: CancellationToken,
    errors: mpsc::Sender<Error>,
) {
    if interval.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = transport.keepalive() => result,
        };
        if let Err(e) = result {
            warn!(error = %e, "Keepalive failed");
            if errors.try_send(e).is_err() {
                debug!("Keepalive error queue full, dropping error");
            }
            break;
        }
    }
    debug!("Keepalive task exited");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::auth::{AuthMaterial, PasswordCredential};
    use crate::transport::RemoteSession;

    /// Transport that only counts keepalives; sessions are never opened.
    struct ProbeTransport {
        keepalives: AtomicUsize,
        fail_keepalive: bool,
    }

    #[async_trait]
    impl Transport for ProbeTransport {
        async fn open_session(&self) -> Result<Box<dyn RemoteSession>> {
            Err(Error::transport("sessions unsupported"))
        }

        async fn keepalive(&self) -> Result<()> {
            self.keepalives.fetch_add(1, Ordering::SeqCst);
            if self.fail_keepalive {
                Err(Error::transport("keepalive failed: connection reset"))
            } else {
                Ok(())
            }
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct ProbeConnector {
        fail_keepalive: bool,
    }

    #[async_trait]
    impl Connector for ProbeConnector {
        async fn connect(&self, endpoint: &Endpoint, auth: AuthMaterial) -> Result<Arc<dyn Transport>> {
            assert_eq!(endpoint.user, "tester");
            assert_eq!(auth.method(), "password");
            Ok(Arc::new(ProbeTransport {
                keepalives: AtomicUsize::new(0),
                fail_keepalive: self.fail_keepalive,
            }))
        }
    }

    fn manager(fail_keepalive: bool) -> SessionManager<ProbeConnector> {
        let config = ClientConfig::new("tester").with_keepalive_interval(Duration::from_secs(30));
        let mut manager = SessionManager::new(config, ProbeConnector { fail_keepalive });
        manager.set_fallback_credential(None);
        manager
    }

    fn password() -> Arc<dyn Credential> {
        Arc::new(PasswordCredential::new("secret"))
    }

    #[tokio::test]
    async fn connect_and_disconnect() {
        let manager = manager(false);
        assert_eq!(manager.phase().await, SessionPhase::Disconnected);

        manager.connect("example.org", 22, password()).await.unwrap();
        assert!(manager.is_connected().await);
        assert_eq!(manager.phase().await, SessionPhase::Connected);

        manager.disconnect().await.unwrap();
        assert!(!manager.is_connected().await);
        manager.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn run_requires_connection_then_display() {
        let manager = manager(false);
        let cancel = CancellationToken::new();
        assert!(matches!(manager.run(&cancel).await, Err(Error::NotConnected)));

        manager.connect("example.org", 22, password()).await.unwrap();
        assert!(matches!(manager.run(&cancel).await, Err(Error::DisplayNotSet)));
    }

    #[tokio::test]
    async fn reconnect_without_any_credential_fails() {
        let manager = manager(false);
        assert!(matches!(manager.reconnect(None).await, Err(Error::NoCredential)));
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_failure_is_queued_not_fatal() {
        let manager = manager(true);
        manager.connect("example.org", 22, password()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        let errors = manager.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("keepalive failed"));
        assert!(manager.is_connected().await);
        assert!(manager.take_errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_stops_with_connection() {
        let manager = manager(true);
        manager.connect("example.org", 22, password()).await.unwrap();
        manager.disconnect().await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(manager.take_errors().is_empty());
    }

    #[tokio::test]
    async fn credential_failure_is_wrapped_with_name() {
        struct Broken;

        #[async_trait]
        impl Credential for Broken {
            fn name(&self) -> &str {
                "broken"
            }

            async fn resolve(&self) -> Result<AuthMaterial> {
                Err(Error::transport("agent socket vanished"))
            }
        }

        let manager = manager(false);
        let err = manager
            .connect("example.org", 22, Arc::new(Broken))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Credential { ref name, .. } if name == "broken"));
        assert!(err.is_fatal());
    }
}

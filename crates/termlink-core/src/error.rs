//! Error types for termlink.

use thiserror::Error;

/// Phrases that identify a transport failure worth reconnecting over.
///
/// Matched case-insensitively against the error description. Connection
/// errors are classified by their source, never by the endpoint.
const TRANSIENT_PHRASES: &[&str] = &[
    "connection reset",
    "broken pipe",
    "connection refused",
    "no route to host",
    "network is unreachable",
    "timed out",
    "eof",
    "disconnect",
    "connection lost",
    "connection closed",
];

/// How a failure should be handled by the session supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network-level failure; reconnecting may help.
    Transient,
    /// Reconnecting will not help; surface immediately.
    Fatal,
    /// The caller asked us to stop.
    Cancelled,
}

/// Main error type for termlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport layer error (read, write or channel failure).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Dial or handshake failure, with the endpoint it was aimed at.
    #[error("connection to {host}:{port} failed: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: Box<Error>,
    },

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Credential could not be turned into authentication material.
    #[error("authentication failed (method: {name}): {message}")]
    Credential { name: String, message: String },

    /// No credential available to resume a session.
    #[error("no authentication method available for reconnection")]
    NoCredential,

    /// Server rejected every authentication attempt.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// `run` was called before a display was attached.
    #[error("display not set")]
    DisplayNotSet,

    /// Window change requested on a session without a PTY.
    #[error("no PTY requested")]
    NoPty,

    /// Terminal dimensions must be non-zero.
    #[error("invalid terminal size: {width}x{height}")]
    InvalidTerminalSize { width: u16, height: u16 },

    /// Display backend failure.
    #[error("display error: {message}")]
    Display { message: String },

    /// Remote side violated the protocol.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// A transient failure occurred but reconnection is turned off.
    #[error("session failed and reconnection is disabled: {cause}")]
    ReconnectDisabled { cause: Box<Error> },

    /// Every reconnection attempt failed.
    #[error("session failed and reconnect failed after {attempts} attempts: {last} (original: {cause})")]
    ReconnectExhausted {
        attempts: u32,
        cause: Box<Error>,
        last: Box<Error>,
    },

    /// An explicit reconnection request failed on every attempt.
    #[error("failed to reconnect after {attempts} attempts: {last}")]
    ReconnectFailed { attempts: u32, last: Box<Error> },
}

impl Error {
    /// Shorthand for a transport error with a formatted message.
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
        }
    }

    /// Wrap an error with the endpoint it occurred on.
    pub fn connection(host: impl Into<String>, port: u16, source: Error) -> Self {
        Error::Connection {
            host: host.into(),
            port,
            source: Box::new(source),
        }
    }

    /// Classify this error for the reconnection supervisor.
    ///
    /// Cancellation always wins. Usage and credential errors are fatal
    /// regardless of wording. A connection error takes the class of its
    /// source; everything else is transient only if its description names a
    /// known transport failure.
    pub fn classify(&self) -> FailureKind {
        match self {
            Error::Cancelled => FailureKind::Cancelled,
            Error::NotConnected
            | Error::DisplayNotSet
            | Error::NoPty
            | Error::InvalidTerminalSize { .. }
            | Error::Credential { .. }
            | Error::NoCredential
            | Error::AuthenticationFailed
            | Error::ReconnectDisabled { .. }
            | Error::ReconnectExhausted { .. }
            | Error::ReconnectFailed { .. } => FailureKind::Fatal,
            // The endpoint is user input; only the underlying failure counts.
            Error::Connection { source, .. } => source.classify(),
            other => {
                let description = other.to_string().to_lowercase();
                if TRANSIENT_PHRASES.iter().any(|p| description.contains(p)) {
                    FailureKind::Transient
                } else {
                    FailureKind::Fatal
                }
            }
        }
    }

    /// Returns true if reconnecting may recover from this error.
    pub fn is_transient(&self) -> bool {
        self.classify() == FailureKind::Transient
    }

    /// Returns true if this error must be surfaced without retrying.
    pub fn is_fatal(&self) -> bool {
        self.classify() == FailureKind::Fatal
    }

    /// Returns true if this error represents caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// For an exhausted reconnection, tells whether the network stayed down
    /// (as opposed to a credential or protocol problem blocking the resume).
    ///
    /// Returns `None` for every other error.
    pub fn network_stayed_down(&self) -> Option<bool> {
        match self {
            Error::ReconnectExhausted { last, .. } | Error::ReconnectFailed { last, .. } => {
                Some(last.is_transient())
            }
            _ => None,
        }
    }
}

/// Convenience result type for termlink operations.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

//! Protocol and configuration constants for termlink.

use std::time::Duration;

// =============================================================================
// Connection Constants
// =============================================================================

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Timeout for dialing and completing the transport handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between transport keepalive requests.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Depth of the keepalive error queue exposed to callers.
pub const KEEPALIVE_ERROR_QUEUE_DEPTH: usize = 10;

// =============================================================================
// Reconnection Constants
// =============================================================================

/// Reconnection attempts before giving up. Zero disables reconnection.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Delay before the first reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Growth factor applied to the delay after every attempt.
pub const DEFAULT_RECONNECT_MULTIPLIER: f64 = 1.5;

// =============================================================================
// Terminal Constants
// =============================================================================

/// Terminal type advertised in the PTY request.
pub const DEFAULT_TERMINAL_TYPE: &str = "xterm-256color";

/// Initial terminal width in columns.
pub const DEFAULT_WIDTH: u16 = 80;

/// Initial terminal height in rows.
pub const DEFAULT_HEIGHT: u16 = 24;

/// Tab stops are placed every this many columns.
pub const TAB_WIDTH: u16 = 8;

/// Upper bound on accumulated control sequence parameters.
pub const MAX_CSI_PARAMS: usize = 16;

/// How often the resize monitor samples display dimensions.
pub const RESIZE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Depth of a display's pending input queue.
pub const INPUT_QUEUE_DEPTH: usize = 100;

/// Read buffer size for remote shell output.
pub const READ_BUFFER_SIZE: usize = 32 * 1024;

// =============================================================================
// Session Pump Constants
// =============================================================================

/// Capacity of the per-attempt completion queue (one slot per pump task).
pub const COMPLETION_QUEUE_DEPTH: usize = 3;

// =============================================================================
// Synchronization Constants
// =============================================================================

/// Longest a single long-poll request may wait.
pub const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(30);

//! termlink-test-utils: Test infrastructure for termlink.
//!
//! Provides:
//! - MockConnector: In-memory transports with scripted connect failures
//! - MockShell: The remote end of a shell started on a mock transport
//! - ScriptedDisplay: Display whose size and input the test controls
//! - StaticCredential / RecordingSleeper: Deterministic credentials and backoff

mod mock_transport;
mod scripted_display;
mod test_credentials;

pub use mock_transport::{MockConnector, MockShell, MockTransport};
pub use scripted_display::ScriptedDisplay;
pub use test_credentials::{RecordingSleeper, StaticCredential};

//! Display consumer contract.
//!
//! A display receives remote output, reports its dimensions and produces the
//! user's input bytes. The session manager depends on nothing else.

use async_trait::async_trait;

use termlink_core::Result;
use termlink_core::config::ClientConfig;
use termlink_core::constants::{
    DEFAULT_HEIGHT, DEFAULT_TERMINAL_TYPE, DEFAULT_WIDTH, INPUT_QUEUE_DEPTH,
};

/// Backend that presents a remote terminal session.
///
/// Every method takes `&self`; implementations synchronize internally so the
/// reader, writer and resize tasks of a session can share one display.
#[async_trait]
pub trait Display: Send + Sync {
    /// Prepare the backend. Called once when the display is attached.
    async fn init(&self) -> Result<()>;

    /// Present a chunk of remote output.
    async fn render(&self, data: &[u8]) -> Result<()>;

    /// Blank the presented screen.
    async fn clear(&self) -> Result<()>;

    /// Change the presented dimensions.
    async fn set_size(&self, width: u16, height: u16) -> Result<()>;

    /// Current `(width, height)`.
    fn size(&self) -> (u16, u16);

    /// Wait for the next chunk of user input.
    ///
    /// `Ok(None)` marks the end of the input stream.
    async fn handle_input(&self) -> Result<Option<Vec<u8>>>;

    /// Release the backend. Pending [`handle_input`](Display::handle_input)
    /// calls observe end of input.
    async fn close(&self) -> Result<()>;
}

/// Options shared by display backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    /// Terminal type advertised for the PTY.
    pub terminal_type: String,
    pub initial_width: u16,
    pub initial_height: u16,
    /// Pending input chunks buffered before new input is dropped.
    pub input_queue_depth: usize,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            terminal_type: DEFAULT_TERMINAL_TYPE.to_string(),
            initial_width: DEFAULT_WIDTH,
            initial_height: DEFAULT_HEIGHT,
            input_queue_depth: INPUT_QUEUE_DEPTH,
        }
    }
}

impl ViewOptions {
    /// Options matching a client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            terminal_type: config.default_terminal.clone(),
            initial_width: config.initial_width,
            initial_height: config.initial_height,
            input_queue_depth: config.input_queue_depth,
        }
    }

    /// Override the initial dimensions.
    pub fn with_size(mut self, width: u16, height: u16) -> Self {
        self.initial_width = width;
        self.initial_height = height;
        self
    }

    /// Override the input queue depth.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.input_queue_depth = depth;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = ViewOptions::default();
        assert_eq!(options.terminal_type, "xterm-256color");
        assert_eq!((options.initial_width, options.initial_height), (80, 24));
        assert_eq!(options.input_queue_depth, 100);
    }

    #[test]
    fn options_follow_config() {
        let config = ClientConfig::new("alice")
            .with_terminal("vt100")
            .with_initial_size(132, 43);
        let config = ClientConfig {
            input_queue_depth: 7,
            ..config
        };
        let options = ViewOptions::from_config(&config);
        assert_eq!(options.terminal_type, "vt100");
        assert_eq!(options.input_queue_depth, 7);
        assert_eq!(options.with_size(10, 5).initial_width, 10);
    }
}

//! Display driven by the test.
//!
//! Records everything rendered, serves input the test pushes and reports a
//! size the test can change at any time.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use termlink_client::Display;
use termlink_core::{Error, Result};

/// A [`Display`] for tests.
pub struct ScriptedDisplay {
    size: Mutex<(u16, u16)>,
    rendered: Mutex<Vec<u8>>,
    renders: watch::Sender<usize>,
    input_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    input_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    render_failure: Mutex<Option<String>>,
    inits: Mutex<usize>,
    closed: Mutex<bool>,
}

impl ScriptedDisplay {
    pub fn new(width: u16, height: u16) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (renders, _) = watch::channel(0);
        Self {
            size: Mutex::new((width, height)),
            rendered: Mutex::new(Vec::new()),
            renders,
            input_tx: Mutex::new(Some(input_tx)),
            input_rx: tokio::sync::Mutex::new(input_rx),
            render_failure: Mutex::new(None),
            inits: Mutex::new(0),
            closed: Mutex::new(false),
        }
    }

    /// Change the size reported to the session.
    pub fn set_dimensions(&self, width: u16, height: u16) {
        *self.size.lock().unwrap() = (width, height);
    }

    /// Queue user input.
    pub fn push_input(&self, data: &[u8]) {
        if let Some(tx) = self.input_tx.lock().unwrap().as_ref() {
            let _ = tx.send(data.to_vec());
        }
    }

    /// End the input stream once queued input is consumed.
    pub fn end_input(&self) {
        self.input_tx.lock().unwrap().take();
    }

    /// Make every following render fail with a display error.
    pub fn fail_renders(&self, message: &str) {
        *self.render_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Every byte rendered so far.
    pub fn rendered(&self) -> Vec<u8> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn rendered_text(&self) -> String {
        String::from_utf8_lossy(&self.rendered()).into_owned()
    }

    /// Wait until the rendered output contains `needle`.
    pub async fn wait_for_output(&self, needle: &str) {
        let mut renders = self.renders.subscribe();
        while !self.rendered_text().contains(needle) {
            if renders.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn init_count(&self) -> usize {
        *self.inits.lock().unwrap()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl Display for ScriptedDisplay {
    async fn init(&self) -> Result<()> {
        *self.inits.lock().unwrap() += 1;
        Ok(())
    }

    async fn render(&self, data: &[u8]) -> Result<()> {
        if let Some(message) = self.render_failure.lock().unwrap().clone() {
            return Err(Error::Display { message });
        }
        self.rendered.lock().unwrap().extend_from_slice(data);
        self.renders.send_modify(|count| *count += 1);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.rendered.lock().unwrap().clear();
        Ok(())
    }

    async fn set_size(&self, width: u16, height: u16) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidTerminalSize { width, height });
        }
        self.set_dimensions(width, height);
        Ok(())
    }

    fn size(&self) -> (u16, u16) {
        *self.size.lock().unwrap()
    }

    async fn handle_input(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.input_rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<()> {
        *self.closed.lock().unwrap() = true;
        self.end_input();
        Ok(())
    }
}

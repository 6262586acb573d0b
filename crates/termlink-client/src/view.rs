//! Headless display backed by the terminal engine.
//!
//! [`EngineView`] interprets remote output into a [`TerminalEngine`] and,
//! when built with a synchronizer, publishes every content change so that
//! long-poll consumers can follow the screen. Input is fed in through a
//! bounded queue with [`EngineView::send_input`].

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use termlink_core::constants::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use termlink_core::sync::StateSynchronizer;
use termlink_core::terminal::TerminalEngine;
use termlink_core::{Error, Result};

use crate::display::{Display, ViewOptions};

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Display that keeps the emulated screen in memory.
pub struct EngineView {
    options: ViewOptions,
    engine: TerminalEngine,
    synchronizer: Option<Arc<StateSynchronizer>>,
    /// Serializes snapshot-and-publish so versions follow engine order.
    publish_lock: StdMutex<()>,
    input_tx: StdMutex<Option<mpsc::Sender<Vec<u8>>>>,
    input_rx: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl EngineView {
    /// Create a view. Zero initial dimensions fall back to 80x24.
    pub fn new(mut options: ViewOptions) -> Self {
        if options.initial_width == 0 {
            options.initial_width = DEFAULT_WIDTH;
        }
        if options.initial_height == 0 {
            options.initial_height = DEFAULT_HEIGHT;
        }
        let (input_tx, input_rx) = mpsc::channel(options.input_queue_depth.max(1));
        Self {
            engine: TerminalEngine::new(options.initial_width, options.initial_height),
            options,
            synchronizer: None,
            publish_lock: StdMutex::new(()),
            input_tx: StdMutex::new(Some(input_tx)),
            input_rx: Mutex::new(input_rx),
        }
    }

    /// Publish screen changes to a fresh synchronizer.
    pub fn with_synchronizer(mut self) -> Self {
        self.synchronizer = Some(Arc::new(StateSynchronizer::new()));
        self
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    pub fn engine(&self) -> &TerminalEngine {
        &self.engine
    }

    pub fn synchronizer(&self) -> Option<&Arc<StateSynchronizer>> {
        self.synchronizer.as_ref()
    }

    /// Queue input for the remote shell.
    ///
    /// Returns false if the input was dropped because the queue is full or
    /// the view is closed.
    pub fn send_input(&self, data: Vec<u8>) -> bool {
        let guard = lock(&self.input_tx);
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(data) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(len = dropped.len(), "Input queue full, dropping input");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Hand the current screen to the synchronizer if it changed.
    fn publish(&self) {
        let Some(sync) = &self.synchronizer else {
            return;
        };
        let _publishing = lock(&self.publish_lock);
        let snapshot = self.engine.snapshot();
        if let Some(current) = sync.current_snapshot()
            && current.screen == snapshot.screen
            && current.cursor == snapshot.cursor
        {
            return;
        }
        sync.update_state(snapshot);
    }
}

#[async_trait]
impl Display for EngineView {
    async fn init(&self) -> Result<()> {
        let (width, height) = self.engine.size();
        debug!(width, height, term = %self.options.terminal_type, "Engine view initialized");
        Ok(())
    }

    async fn render(&self, data: &[u8]) -> Result<()> {
        self.engine.render(data);
        self.publish();
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.engine.clear();
        self.publish();
        Ok(())
    }

    async fn set_size(&self, width: u16, height: u16) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidTerminalSize { width, height });
        }
        self.engine.resize(width, height);
        self.publish();
        Ok(())
    }

    fn size(&self) -> (u16, u16) {
        self.engine.size()
    }

    async fn handle_input(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.input_rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<()> {
        if lock(&self.input_tx).take().is_some() {
            debug!("Engine view closed");
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

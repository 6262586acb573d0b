//! Credentials and sleepers with observable behavior.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use termlink_client::{AuthMaterial, Credential};
use termlink_core::session::Sleeper;
use termlink_core::{Error, Result};

/// Credential resolving to a fixed password, or to a fixed failure.
pub struct StaticCredential {
    name: String,
    password: Option<String>,
    resolves: AtomicUsize,
}

impl StaticCredential {
    pub fn password(password: &str) -> Self {
        Self {
            name: "static".to_string(),
            password: Some(password.to_string()),
            resolves: AtomicUsize::new(0),
        }
    }

    /// A credential whose resolution always fails.
    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            password: None,
            resolves: AtomicUsize::new(0),
        }
    }

    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Credential for StaticCredential {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self) -> Result<AuthMaterial> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        match &self.password {
            Some(password) => Ok(AuthMaterial::Password(password.clone())),
            None => Err(Error::Credential {
                name: self.name.clone(),
                message: "no material available".to_string(),
            }),
        }
    }
}

/// Sleeper that records requested delays and returns at once.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

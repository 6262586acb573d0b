//! Long-poll service for browser consumers.
//!
//! Binds an [`EngineView`]'s synchronizer to the poll request/response wire
//! types and translates browser key events into terminal input. HTTP routing
//! is left to the embedding server.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use termlink_core::sync::{PollRequest, PollResponse, StateSynchronizer, VersionedSnapshot, WireState};
use termlink_core::{Error, Result};

use crate::view::EngineView;

/// Browser input event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    /// `keydown` or `paste`; anything else is ignored.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    #[serde(default, rename = "keyCode", skip_serializing_if = "is_zero")]
    pub key_code: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
    #[serde(default)]
    pub timestamp: i64,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl InputEvent {
    pub fn keydown(key: impl Into<String>) -> Self {
        Self {
            kind: "keydown".to_string(),
            key: key.into(),
            key_code: 0,
            data: String::new(),
            timestamp: 0,
        }
    }

    pub fn paste(data: impl Into<String>) -> Self {
        Self {
            kind: "paste".to_string(),
            key: String::new(),
            key_code: 0,
            data: data.into(),
            timestamp: 0,
        }
    }

    /// Terminal bytes for this event, if it produces any.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self.kind.as_str() {
            "keydown" => key_bytes(&self.key),
            "paste" if !self.data.is_empty() => Some(self.data.clone().into_bytes()),
            _ => None,
        }
    }
}

fn key_bytes(key: &str) -> Option<Vec<u8>> {
    let sequence: &[u8] = match key {
        "Enter" => b"\r",
        "Backspace" => b"\x08",
        "Tab" => b"\t",
        "Escape" => b"\x1b",
        "ArrowUp" => b"\x1b[A",
        "ArrowDown" => b"\x1b[B",
        "ArrowRight" => b"\x1b[C",
        "ArrowLeft" => b"\x1b[D",
        "Home" => b"\x1b[H",
        "End" => b"\x1b[F",
        "PageUp" => b"\x1b[5~",
        "PageDown" => b"\x1b[6~",
        "Delete" => b"\x1b[3~",
        "Insert" => b"\x1b[2~",
        // A printable key names itself; other named keys produce nothing.
        other => {
            let mut chars = other.chars();
            return match (chars.next(), chars.next()) {
                (Some(_), None) => Some(other.as_bytes().to_vec()),
                _ => None,
            };
        }
    };
    Some(sequence.to_vec())
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Poll endpoint state for one view.
#[derive(Clone)]
pub struct PollService {
    view: Arc<EngineView>,
    synchronizer: Arc<StateSynchronizer>,
}

impl PollService {
    /// Fails if the view was built without a synchronizer.
    pub fn new(view: Arc<EngineView>) -> Result<Self> {
        let synchronizer = view
            .synchronizer()
            .cloned()
            .ok_or_else(|| Error::Display {
                message: "view does not publish state".to_string(),
            })?;
        Ok(Self { view, synchronizer })
    }

    pub fn view(&self) -> &Arc<EngineView> {
        &self.view
    }

    /// Answer a long-poll.
    ///
    /// A consumer that is behind gets the full current state immediately. A
    /// caught-up consumer waits for the next update or the request timeout,
    /// which answers `timeout: true` with the current version. `cancel`
    /// abandons the poll with [`Error::Cancelled`].
    pub async fn handle_poll(
        &self,
        request: PollRequest,
        cancel: &CancellationToken,
    ) -> Result<PollResponse> {
        let timeout = request.timeout();
        tokio::select! {
            biased;
            result = self.synchronizer.poll_changes_with_cancel(request.version, cancel) => {
                result.map(|diff| PollResponse::changed(&diff))
            }
            _ = tokio::time::sleep(timeout) => {
                let version = self.synchronizer.current_version();
                debug!(since = request.version, version, "Poll timed out");
                Ok(PollResponse::timed_out(version))
            }
        }
    }

    /// Full screen state for a consumer that is attaching.
    ///
    /// Before the first published update this reflects the view's blank
    /// screen at version 0.
    pub fn current_state(&self) -> WireState {
        match self.synchronizer.current_snapshot() {
            Some(snapshot) => WireState::from(&*snapshot),
            None => {
                let snapshot = self.view.engine().snapshot();
                WireState::from(&VersionedSnapshot {
                    version: 0,
                    screen: snapshot.screen,
                    cursor: snapshot.cursor,
                    timestamp: unix_nanos(),
                })
            }
        }
    }

    /// Queue the terminal bytes for `events`. Returns how many events were
    /// queued; events that produce no bytes or hit a full queue are skipped.
    pub fn send_input(&self, events: &[InputEvent]) -> usize {
        events
            .iter()
            .filter_map(InputEvent::to_bytes)
            .map(|bytes| self.view.send_input(bytes))
            .filter(|queued| *queued)
            .count()
    }
}

// =============================================================================
// Tests
// =============================================================================

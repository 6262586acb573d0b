//! JSON wire types for long-poll consumers.
//!
//! Colors travel as `#RRGGBB` strings and characters as code points. The
//! underline attribute is not part of the wire cell.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::diff::{CellChange, Diff, VersionedSnapshot};
use crate::constants::MAX_POLL_TIMEOUT;
use crate::terminal::{Cell, ColorRole};

/// A cell as seen by a remote consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCell {
    /// Unicode code point.
    #[serde(rename = "char")]
    pub ch: u32,
    pub fg_color: String,
    pub bg_color: String,
    pub bold: bool,
    pub inverse: bool,
    pub blink: bool,
}

impl From<&Cell> for WireCell {
    fn from(cell: &Cell) -> Self {
        Self {
            ch: u32::from(cell.ch),
            fg_color: cell.fg.hex(ColorRole::Foreground),
            bg_color: cell.bg.hex(ColorRole::Background),
            bold: cell.bold,
            inverse: cell.inverse,
            blink: cell.blink,
        }
    }
}

/// One changed cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireChange {
    pub x: u16,
    pub y: u16,
    pub cell: WireCell,
}

impl From<&CellChange> for WireChange {
    fn from(change: &CellChange) -> Self {
        Self {
            x: change.x,
            y: change.y,
            cell: WireCell::from(&change.cell),
        }
    }
}

/// A diff as sent to a remote consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireDiff {
    pub version: u64,
    pub cursor_x: u16,
    pub cursor_y: u16,
    pub timestamp: i64,
    pub changes: Vec<WireChange>,
}

impl From<&Diff> for WireDiff {
    fn from(diff: &Diff) -> Self {
        Self {
            version: diff.version,
            cursor_x: diff.cursor.x,
            cursor_y: diff.cursor.y,
            timestamp: diff.timestamp,
            changes: diff.changes.iter().map(WireChange::from).collect(),
        }
    }
}

/// Full screen state for a consumer that is just attaching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireState {
    /// Rows of cells, top to bottom.
    pub buffer: Vec<Vec<WireCell>>,
    pub width: u16,
    pub height: u16,
    pub cursor_x: u16,
    pub cursor_y: u16,
    pub version: u64,
    pub timestamp: i64,
}

impl From<&VersionedSnapshot> for WireState {
    fn from(snapshot: &VersionedSnapshot) -> Self {
        let screen = &snapshot.screen;
        let buffer = (0..screen.rows())
            .filter_map(|y| screen.row(y))
            .map(|row| row.iter().map(WireCell::from).collect())
            .collect();
        Self {
            buffer,
            width: screen.cols(),
            height: screen.rows(),
            cursor_x: snapshot.cursor.x,
            cursor_y: snapshot.cursor.y,
            version: snapshot.version,
            timestamp: snapshot.timestamp,
        }
    }
}

/// Long-poll request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollRequest {
    /// Last version the consumer has applied.
    pub version: u64,
    /// Requested wait in milliseconds; zero or absent means the maximum.
    #[serde(default, alias = "timeout")]
    pub timeout_ms: u64,
}

impl PollRequest {
    pub fn new(version: u64, timeout_ms: u64) -> Self {
        Self {
            version,
            timeout_ms,
        }
    }

    /// Effective wait, within `(0, 30s]`.
    pub fn timeout(&self) -> Duration {
        let requested = Duration::from_millis(self.timeout_ms);
        if requested.is_zero() || requested > MAX_POLL_TIMEOUT {
            MAX_POLL_TIMEOUT
        } else {
            requested
        }
    }
}

/// Long-poll response.
///
/// A timeout sets `timeout: true` with no changes, which is distinct from a
/// real update that happens to carry zero changed cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub changes: Option<WireDiff>,
    pub version: u64,
    pub timeout: bool,
}

impl PollResponse {
    pub fn changed(diff: &Diff) -> Self {
        Self {
            changes: Some(WireDiff::from(diff)),
            version: diff.version,
            timeout: false,
        }
    }

    pub fn timed_out(version: u64) -> Self {
        Self {
            changes: None,
            version,
            timeout: true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::terminal::{Color, Cursor, Screen};

    #[test]
    fn cell_serializes_to_wire_shape() {
        let mut cell = Cell::new('A');
        cell.fg = Color::Indexed(1);
        cell.bold = true;
        cell.underline = true;
        let value = serde_json::to_value(WireCell::from(&cell)).unwrap();
        assert_eq!(
            value,
            json!({
                "char": 65,
                "fg_color": "#800000",
                "bg_color": "#000000",
                "bold": true,
                "inverse": false,
                "blink": false,
            })
        );
    }

    #[test]
    fn diff_serializes_to_wire_shape() {
        let diff = Diff {
            version: 7,
            cursor: Cursor::new(3, 4),
            timestamp: 1_700_000_000_000_000_000,
            changes: vec![CellChange {
                x: 1,
                y: 2,
                cell: Cell::new('z'),
            }],
        };
        let value = serde_json::to_value(WireDiff::from(&diff)).unwrap();
        assert_eq!(value["version"], 7);
        assert_eq!(value["cursor_x"], 3);
        assert_eq!(value["cursor_y"], 4);
        assert_eq!(value["timestamp"], 1_700_000_000_000_000_000i64);
        assert_eq!(value["changes"][0]["x"], 1);
        assert_eq!(value["changes"][0]["y"], 2);
        assert_eq!(value["changes"][0]["cell"]["char"], 'z' as u32);
        assert_eq!(value["changes"][0]["cell"]["fg_color"], "#FFFFFF");
    }

    #[test]
    fn poll_request_timeout_is_clamped() {
        assert_eq!(PollRequest::new(0, 0).timeout(), Duration::from_secs(30));
        assert_eq!(PollRequest::new(0, 250).timeout(), Duration::from_millis(250));
        assert_eq!(PollRequest::new(0, 30_000).timeout(), Duration::from_secs(30));
        assert_eq!(PollRequest::new(0, 90_000).timeout(), Duration::from_secs(30));
    }

    #[test]
    fn poll_request_parses_optional_timeout() {
        let req: PollRequest = serde_json::from_str(r#"{"version": 12}"#).unwrap();
        assert_eq!(req, PollRequest::new(12, 0));
        let req: PollRequest =
            serde_json::from_str(r#"{"version": 3, "timeout_ms": 500}"#).unwrap();
        assert_eq!(req.timeout(), Duration::from_millis(500));
        let req: PollRequest = serde_json::from_str(r#"{"version": 3, "timeout": 100}"#).unwrap();
        assert_eq!(req.timeout_ms, 100);
    }

    #[test]
    fn timeout_response_differs_from_empty_change() {
        let empty = Diff {
            version: 4,
            cursor: Cursor::default(),
            timestamp: 0,
            changes: Vec::new(),
        };
        let changed = serde_json::to_value(PollResponse::changed(&empty)).unwrap();
        let timed_out = serde_json::to_value(PollResponse::timed_out(4)).unwrap();
        assert_eq!(changed["timeout"], false);
        assert!(changed["changes"].is_object());
        assert_eq!(timed_out["timeout"], true);
        assert!(timed_out["changes"].is_null());
        assert_ne!(changed, timed_out);
    }

    #[test]
    fn state_lists_rows() {
        let mut screen = Screen::new(3, 2);
        screen.set(2, 1, Cell::new('q'));
        let snapshot = VersionedSnapshot {
            version: 1,
            screen,
            cursor: Cursor::new(0, 1),
            timestamp: 5,
        };
        let state = WireState::from(&snapshot);
        assert_eq!((state.width, state.height), (3, 2));
        assert_eq!(state.buffer.len(), 2);
        assert_eq!(state.buffer[1][2].ch, 'q' as u32);
    }
}

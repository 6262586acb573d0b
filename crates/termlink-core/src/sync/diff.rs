//! Cell-level diffs between screen snapshots.

use serde::{Deserialize, Serialize};

use crate::terminal::{Cell, Cursor, Screen};

/// A published screen state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedSnapshot {
    /// Monotonic version, starting at 1.
    pub version: u64,
    pub screen: Screen,
    pub cursor: Cursor,
    /// Unix time in nanoseconds when the snapshot was installed.
    pub timestamp: i64,
}

/// A single cell change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellChange {
    pub x: u16,
    pub y: u16,
    pub cell: Cell,
}

/// Changes that bring a consumer up to `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub version: u64,
    pub cursor: Cursor,
    pub timestamp: i64,
    /// Row-major within each section: overlap first, then grown area.
    pub changes: Vec<CellChange>,
}

impl Diff {
    /// Diff from `old` to `new`.
    pub fn between(old: &VersionedSnapshot, new: &VersionedSnapshot) -> Self {
        Self::with_changes(new, diff_screens(&old.screen, &new.screen))
    }

    /// Diff that treats every cell of `snapshot` as changed.
    pub fn full(snapshot: &VersionedSnapshot) -> Self {
        let changes = snapshot
            .screen
            .iter()
            .map(|(x, y, cell)| CellChange { x, y, cell: *cell })
            .collect();
        Self::with_changes(snapshot, changes)
    }

    fn with_changes(snapshot: &VersionedSnapshot, changes: Vec<CellChange>) -> Self {
        Self {
            version: snapshot.version,
            cursor: snapshot.cursor,
            timestamp: snapshot.timestamp,
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Cells of `new` that differ from `old`.
///
/// Every attribute is compared over the overlapping rectangle. When `new` is
/// wider or taller, every cell outside the old bounds is appended. Cells that
/// disappear on shrink produce no entry.
pub fn diff_screens(old: &Screen, new: &Screen) -> Vec<CellChange> {
    let (old_cols, old_rows) = old.size();
    let (new_cols, new_rows) = new.size();
    let mut changes = Vec::new();

    for y in 0..old_rows.min(new_rows) {
        let (Some(before), Some(after)) = (old.row(y), new.row(y)) else {
            continue;
        };
        for (x, (a, b)) in before.iter().zip(after).enumerate() {
            if a != b {
                changes.push(CellChange {
                    x: x as u16,
                    y,
                    cell: *b,
                });
            }
        }
    }

    if new_cols > old_cols || new_rows > old_rows {
        changes.extend(
            new.iter()
                .filter(|&(x, y, _)| x >= old_cols || y >= old_rows)
                .map(|(x, y, cell)| CellChange { x, y, cell: *cell }),
        );
    }

    changes
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::Color;

    fn snapshot(version: u64, screen: Screen) -> VersionedSnapshot {
        VersionedSnapshot {
            version,
            screen,
            cursor: Cursor::default(),
            timestamp: 0,
        }
    }

    #[test]
    fn identical_screens_have_no_changes() {
        let screen = Screen::new(10, 5);
        assert!(diff_screens(&screen, &screen.clone()).is_empty());
    }

    #[test]
    fn single_cell_change() {
        let old = Screen::new(80, 24);
        let mut new = old.clone();
        new.set(7, 3, Cell::new('x'));
        let changes = diff_screens(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!((changes[0].x, changes[0].y), (7, 3));
        assert_eq!(changes[0].cell.ch, 'x');
    }

    #[test]
    fn attribute_only_change_is_detected() {
        let old = Screen::new(4, 1);
        let mut new = old.clone();
        let mut cell = Cell::default();
        cell.underline = true;
        new.set(1, 0, cell);
        cell.underline = false;
        cell.bg = Color::Indexed(3);
        new.set(2, 0, cell);
        assert_eq!(diff_screens(&old, &new).len(), 2);
    }

    #[test]
    fn growth_appends_new_area() {
        let old = Screen::new(2, 2);
        let new = Screen::new(3, 3);
        let changes = diff_screens(&old, &new);
        let coords: Vec<_> = changes.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, vec![(2, 0), (2, 1), (0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn shrink_reports_only_overlap() {
        let mut old = Screen::new(4, 4);
        old.set(3, 3, Cell::new('z'));
        old.set(0, 0, Cell::new('a'));
        let new = Screen::new(2, 2);
        let changes = diff_screens(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!((changes[0].x, changes[0].y), (0, 0));
    }

    #[test]
    fn full_diff_covers_every_cell() {
        let snap = snapshot(9, Screen::new(5, 3));
        let diff = Diff::full(&snap);
        assert_eq!(diff.version, 9);
        assert_eq!(diff.changes.len(), 15);
        assert!(!diff.is_empty());
    }

    #[test]
    fn between_takes_metadata_from_new() {
        let old = snapshot(1, Screen::new(3, 1));
        let mut new = snapshot(2, Screen::new(3, 1));
        new.cursor = Cursor::new(2, 0);
        new.timestamp = 42;
        let diff = Diff::between(&old, &new);
        assert_eq!(diff.version, 2);
        assert_eq!(diff.cursor, Cursor::new(2, 0));
        assert_eq!(diff.timestamp, 42);
        assert!(diff.is_empty());
    }
}

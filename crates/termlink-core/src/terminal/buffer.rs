//! Screen buffer: grid, cursor, scroll region and pen.
//!
//! Every operation keeps the cursor inside `[0, width) x [0, height)` and the
//! scroll region inside `0 <= top <= bottom < height`. Newly blanked cells are
//! drawn with the current pen.

use serde::{Deserialize, Serialize};

use super::screen::{Attributes, Cell, Screen};
use crate::constants::TAB_WIDTH;

/// Cursor position, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cursor {
    pub x: u16,
    pub y: u16,
}

impl Cursor {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// Scroll region margins, 0-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollRegion {
    pub top: u16,
    pub bottom: u16,
}

impl ScrollRegion {
    /// Region covering every row of a screen with `rows` rows.
    pub fn full(rows: u16) -> Self {
        Self {
            top: 0,
            bottom: rows.saturating_sub(1),
        }
    }

    /// Check if a row is within the region.
    pub fn contains(&self, row: u16) -> bool {
        row >= self.top && row <= self.bottom
    }
}

/// Which part of the display or line an erase targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseMode {
    /// From the cursor to the end.
    ToEnd,
    /// From the start through the cursor, inclusive.
    ToCursor,
    /// Everything.
    All,
}

impl EraseMode {
    /// Map an erase parameter (0, 1, 2) to a mode.
    pub fn from_param(param: u16) -> Option<Self> {
        match param {
            0 => Some(EraseMode::ToEnd),
            1 => Some(EraseMode::ToCursor),
            2 => Some(EraseMode::All),
            _ => None,
        }
    }
}

/// The mutable display model driven by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenBuffer {
    screen: Screen,
    cursor: Cursor,
    saved_cursor: Cursor,
    region: ScrollRegion,
    pen: Attributes,
}

impl ScreenBuffer {
    /// Create a blank buffer. Zero dimensions are raised to 1.
    pub fn new(width: u16, height: u16) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            screen: Screen::new(width, height),
            cursor: Cursor::default(),
            saved_cursor: Cursor::default(),
            region: ScrollRegion::full(height),
            pen: Attributes::default(),
        }
    }

    pub fn width(&self) -> u16 {
        self.screen.cols()
    }

    pub fn height(&self) -> u16 {
        self.screen.rows()
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn region(&self) -> ScrollRegion {
        self.region
    }

    pub fn pen(&self) -> &Attributes {
        &self.pen
    }

    pub fn pen_mut(&mut self) -> &mut Attributes {
        &mut self.pen
    }

    fn max_x(&self) -> u16 {
        self.width() - 1
    }

    fn max_y(&self) -> u16 {
        self.height() - 1
    }

    // -------------------------------------------------------------------------
    // Printing and C0 controls
    // -------------------------------------------------------------------------

    /// Write a character at the cursor and advance, wrapping at the width.
    pub fn put_char(&mut self, ch: char) {
        let cell = self.pen.cell(ch);
        self.screen.set(self.cursor.x, self.cursor.y, cell);
        self.cursor.x += 1;
        if self.cursor.x >= self.width() {
            self.newline();
        }
    }

    pub fn carriage_return(&mut self) {
        self.cursor.x = 0;
    }

    /// Move to column 0 of the next line, scrolling the region at its bottom.
    pub fn newline(&mut self) {
        self.cursor.x = 0;
        if self.cursor.y == self.region.bottom {
            self.scroll_up();
        } else if self.cursor.y < self.max_y() {
            self.cursor.y += 1;
        }
    }

    /// Move up one line, scrolling the region down at its top.
    pub fn reverse_newline(&mut self) {
        if self.cursor.y == self.region.top {
            self.scroll_down();
        } else if self.cursor.y > 0 {
            self.cursor.y -= 1;
        }
    }

    pub fn backspace(&mut self) {
        self.cursor.x = self.cursor.x.saturating_sub(1);
    }

    /// Advance to the next tab stop, stopping at the last column.
    pub fn tab(&mut self) {
        let next = (self.cursor.x / TAB_WIDTH + 1).saturating_mul(TAB_WIDTH);
        self.cursor.x = next.min(self.max_x());
    }

    fn scroll_up(&mut self) {
        let blank = self.pen.blank();
        self.screen
            .scroll_up_region(1, self.region.top, self.region.bottom, blank);
    }

    fn scroll_down(&mut self) {
        let blank = self.pen.blank();
        self.screen
            .scroll_down_region(1, self.region.top, self.region.bottom, blank);
    }

    // -------------------------------------------------------------------------
    // Cursor movement
    // -------------------------------------------------------------------------

    pub fn cursor_up(&mut self, n: u16) {
        self.cursor.y = self.cursor.y.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        self.cursor.y = self.cursor.y.saturating_add(n).min(self.max_y());
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor.x = self.cursor.x.saturating_add(n).min(self.max_x());
    }

    pub fn cursor_back(&mut self, n: u16) {
        self.cursor.x = self.cursor.x.saturating_sub(n);
    }

    /// Move to a 1-based `(row, col)`, clamped into the screen.
    pub fn set_position(&mut self, row: u16, col: u16) {
        self.cursor.y = row.clamp(1, self.height()) - 1;
        self.cursor.x = col.clamp(1, self.width()) - 1;
    }

    pub fn save_cursor(&mut self) {
        self.saved_cursor = self.cursor;
    }

    /// Restore the saved cursor, clamped into the current bounds.
    pub fn restore_cursor(&mut self) {
        self.cursor = Cursor {
            x: self.saved_cursor.x.min(self.max_x()),
            y: self.saved_cursor.y.min(self.max_y()),
        };
    }

    // -------------------------------------------------------------------------
    // Erasing
    // -------------------------------------------------------------------------

    pub fn erase_display(&mut self, mode: EraseMode) {
        let blank = self.pen.blank();
        let Cursor { x, y } = self.cursor;
        let (width, height) = self.screen.size();
        match mode {
            EraseMode::ToEnd => {
                self.screen.fill_range(y, x, width, blank);
                for row in y + 1..height {
                    self.screen.fill_row(row, blank);
                }
            }
            EraseMode::ToCursor => {
                for row in 0..y {
                    self.screen.fill_row(row, blank);
                }
                self.screen.fill_range(y, 0, x + 1, blank);
            }
            EraseMode::All => self.screen.fill(blank),
        }
    }

    pub fn erase_line(&mut self, mode: EraseMode) {
        let blank = self.pen.blank();
        let Cursor { x, y } = self.cursor;
        let width = self.width();
        match mode {
            EraseMode::ToEnd => self.screen.fill_range(y, x, width, blank),
            EraseMode::ToCursor => self.screen.fill_range(y, 0, x + 1, blank),
            EraseMode::All => self.screen.fill_row(y, blank),
        }
    }

    // -------------------------------------------------------------------------
    // Region, reset, resize
    // -------------------------------------------------------------------------

    /// Set the scroll region from 1-based margins.
    ///
    /// `top` is clamped to `[1, height]` and `bottom` to `[top, height]`, so a
    /// malformed request still yields a valid region.
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let height = self.height();
        let top = top.clamp(1, height);
        let bottom = bottom.clamp(top, height);
        self.region = ScrollRegion {
            top: top - 1,
            bottom: bottom - 1,
        };
    }

    /// Blank the screen at the default pen and home everything.
    pub fn reset(&mut self) {
        self.pen.reset();
        self.screen.fill(self.pen.blank());
        self.cursor = Cursor::default();
        self.saved_cursor = Cursor::default();
        self.region = ScrollRegion::full(self.height());
    }

    /// Reallocate at a new size, keeping the overlapping content.
    ///
    /// Zero dimensions are raised to 1. Both scroll margins are clamped: the
    /// bottom is reset to the last row and the top kept at most there.
    pub fn resize(&mut self, width: u16, height: u16) {
        let (width, height) = (width.max(1), height.max(1));
        self.screen = self.screen.resized(width, height, self.pen.blank());
        self.cursor.x = self.cursor.x.min(width - 1);
        self.cursor.y = self.cursor.y.min(height - 1);
        self.region = ScrollRegion {
            top: self.region.top.min(height - 1),
            bottom: height - 1,
        };
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::screen::Color;

    fn write(buf: &mut ScreenBuffer, text: &str) {
        for ch in text.chars() {
            buf.put_char(ch);
        }
    }

    #[test]
    fn new_clamps_zero_dimensions() {
        let buf = ScreenBuffer::new(0, 0);
        assert_eq!((buf.width(), buf.height()), (1, 1));
        assert_eq!(buf.region(), ScrollRegion { top: 0, bottom: 0 });
    }

    #[test]
    fn put_char_wraps_immediately() {
        let mut buf = ScreenBuffer::new(3, 2);
        write(&mut buf, "abc");
        assert_eq!(buf.cursor(), Cursor::new(0, 1));
        write(&mut buf, "d");
        assert_eq!(buf.cursor(), Cursor::new(1, 1));
        assert_eq!(buf.screen().row_text(0), "abc");
    }

    #[test]
    fn newline_at_bottom_scrolls_with_pen() {
        let mut buf = ScreenBuffer::new(2, 2);
        write(&mut buf, "abc");
        buf.pen_mut().bg = Color::Indexed(2);
        buf.newline();
        assert_eq!(buf.cursor(), Cursor::new(0, 1));
        assert_eq!(buf.screen().row_text(0), "c ");
        assert_eq!(buf.screen().get(0, 1).unwrap().bg, Color::Indexed(2));
    }

    #[test]
    fn newline_below_region_moves_without_scrolling() {
        let mut buf = ScreenBuffer::new(2, 4);
        buf.set_scroll_region(1, 2);
        buf.set_position(3, 1);
        write(&mut buf, "x");
        buf.newline();
        assert_eq!(buf.cursor(), Cursor::new(0, 3));
        buf.newline();
        assert_eq!(buf.cursor(), Cursor::new(0, 3));
        assert_eq!(buf.screen().row_text(2), "x ");
    }

    #[test]
    fn reverse_newline_at_top_scrolls_down() {
        let mut buf = ScreenBuffer::new(2, 3);
        write(&mut buf, "ab");
        buf.set_position(1, 1);
        buf.reverse_newline();
        assert_eq!(buf.cursor(), Cursor::new(0, 0));
        assert_eq!(buf.screen().row_text(0), "  ");
        assert_eq!(buf.screen().row_text(1), "ab");
    }

    #[test]
    fn tab_stops_and_clamp() {
        let mut buf = ScreenBuffer::new(20, 1);
        buf.tab();
        assert_eq!(buf.cursor().x, 8);
        buf.tab();
        assert_eq!(buf.cursor().x, 16);
        buf.tab();
        assert_eq!(buf.cursor().x, 19);
    }

    #[test]
    fn cursor_moves_clamp() {
        let mut buf = ScreenBuffer::new(10, 5);
        buf.cursor_up(3);
        buf.cursor_back(3);
        assert_eq!(buf.cursor(), Cursor::new(0, 0));
        buf.cursor_down(100);
        buf.cursor_forward(u16::MAX);
        assert_eq!(buf.cursor(), Cursor::new(9, 4));
        buf.set_position(0, 0);
        assert_eq!(buf.cursor(), Cursor::new(0, 0));
        buf.set_position(100, 100);
        assert_eq!(buf.cursor(), Cursor::new(9, 4));
    }

    #[test]
    fn erase_display_modes() {
        let mut buf = ScreenBuffer::new(3, 3);
        write(&mut buf, "abcdefgh");
        buf.set_position(2, 2);
        buf.erase_display(EraseMode::ToEnd);
        assert_eq!(buf.screen().row_text(0), "abc");
        assert_eq!(buf.screen().row_text(1), "d  ");
        assert_eq!(buf.screen().row_text(2), "   ");

        let mut buf = ScreenBuffer::new(3, 3);
        write(&mut buf, "abcdefgh");
        buf.set_position(2, 2);
        buf.erase_display(EraseMode::ToCursor);
        assert_eq!(buf.screen().row_text(0), "   ");
        assert_eq!(buf.screen().row_text(1), "  f");
        assert_eq!(buf.screen().row_text(2), "gh ");
    }

    #[test]
    fn erase_line_modes() {
        let mut buf = ScreenBuffer::new(4, 1);
        write(&mut buf, "abc");
        buf.set_position(1, 2);
        buf.erase_line(EraseMode::ToCursor);
        assert_eq!(buf.screen().row_text(0), "  c ");
        buf.erase_line(EraseMode::All);
        assert_eq!(buf.screen().row_text(0), "    ");
    }

    #[test]
    fn scroll_region_is_lenient() {
        let mut buf = ScreenBuffer::new(10, 10);
        buf.set_scroll_region(8, 3);
        assert_eq!(buf.region(), ScrollRegion { top: 7, bottom: 7 });
        buf.set_scroll_region(0, 50);
        assert_eq!(buf.region(), ScrollRegion { top: 0, bottom: 9 });
        buf.set_scroll_region(20, 20);
        assert_eq!(buf.region(), ScrollRegion { top: 9, bottom: 9 });
    }

    #[test]
    fn restore_cursor_is_clamped_after_resize() {
        let mut buf = ScreenBuffer::new(10, 10);
        buf.set_position(9, 9);
        buf.save_cursor();
        buf.resize(4, 4);
        buf.restore_cursor();
        assert_eq!(buf.cursor(), Cursor::new(3, 3));
    }

    #[test]
    fn resize_clamps_both_margins() {
        let mut buf = ScreenBuffer::new(10, 10);
        buf.set_scroll_region(8, 9);
        buf.resize(10, 5);
        assert_eq!(buf.region(), ScrollRegion { top: 4, bottom: 4 });
        buf.resize(10, 12);
        assert_eq!(buf.region(), ScrollRegion { top: 4, bottom: 11 });
    }

    #[test]
    fn reset_restores_defaults() {
        let mut buf = ScreenBuffer::new(4, 2);
        buf.pen_mut().bold = true;
        write(&mut buf, "abcde");
        buf.set_scroll_region(2, 2);
        buf.reset();
        assert_eq!(buf.cursor(), Cursor::default());
        assert_eq!(buf.region(), ScrollRegion::full(2));
        assert_eq!(*buf.pen(), Attributes::default());
        assert!(buf.screen().iter().all(|(_, _, c)| c.is_default()));
    }
}

//! Screen buffer types.
//!
//! This module provides:
//! - Colors with their `#RRGGBB` rendering
//! - The drawing pen (current attributes) and styled cells
//! - A flat row-major grid with region scrolling and resize

use serde::{Deserialize, Serialize};

// =============================================================================
// Color Types
// =============================================================================

/// The 8-color palette selected by SGR 30-37 / 40-47.
const PALETTE: [(u8, u8, u8); 8] = [
    (0, 0, 0),
    (128, 0, 0),
    (0, 128, 0),
    (128, 128, 0),
    (0, 0, 128),
    (128, 0, 128),
    (0, 128, 128),
    (192, 192, 192),
];

const DEFAULT_FG: (u8, u8, u8) = (255, 255, 255);
const DEFAULT_BG: (u8, u8, u8) = (0, 0, 0);

/// Whether a color is being resolved for the foreground or the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRole {
    Foreground,
    Background,
}

/// Terminal color representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Color {
    /// Default foreground/background color.
    #[default]
    Default,
    /// Palette entry; only the low 3 bits select a color.
    Indexed(u8),
    /// 24-bit RGB color.
    Rgb(u8, u8, u8),
}

impl Color {
    /// Resolve to concrete RGB components.
    pub fn rgb(self, role: ColorRole) -> (u8, u8, u8) {
        match self {
            Color::Default => match role {
                ColorRole::Foreground => DEFAULT_FG,
                ColorRole::Background => DEFAULT_BG,
            },
            Color::Indexed(n) => PALETTE[usize::from(n % 8)],
            Color::Rgb(r, g, b) => (r, g, b),
        }
    }

    /// Render as an uppercase `#RRGGBB` string.
    pub fn hex(self, role: ColorRole) -> String {
        let (r, g, b) = self.rgb(role);
        format!("#{r:02X}{g:02X}{b:02X}")
    }

    /// Parse a `#RRGGBB` string into an RGB color.
    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// The pen used for newly written and newly blanked cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attributes {
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub underline: bool,
    pub inverse: bool,
    pub blink: bool,
}

impl Attributes {
    /// A cell holding `ch` drawn with this pen.
    pub fn cell(&self, ch: char) -> Cell {
        Cell {
            ch,
            fg: self.fg,
            bg: self.bg,
            bold: self.bold,
            underline: self.underline,
            inverse: self.inverse,
            blink: self.blink,
        }
    }

    /// A blank cell drawn with this pen.
    pub fn blank(&self) -> Cell {
        self.cell(' ')
    }

    /// Reset every attribute to default.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// Cell
// =============================================================================

/// A single terminal cell. Compared wholesale when diffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// The character displayed (space for empty).
    pub ch: char,
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub underline: bool,
    pub inverse: bool,
    pub blink: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Attributes::default().blank()
    }
}

impl Cell {
    /// Create a cell with a character and default styling.
    pub fn new(ch: char) -> Self {
        Self {
            ch,
            ..Default::default()
        }
    }

    /// Check if this is a blank cell at the default pen.
    pub fn is_default(&self) -> bool {
        *self == Cell::default()
    }
}

// =============================================================================
// Screen
// =============================================================================

/// A terminal screen buffer stored row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    cells: Vec<Cell>,
    cols: u16,
    rows: u16,
}

impl Screen {
    /// Create a screen filled with default cells.
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::filled(cols, rows, Cell::default())
    }

    /// Create a screen with every cell set to `blank`.
    pub fn filled(cols: u16, rows: u16, blank: Cell) -> Self {
        Self {
            cells: vec![blank; usize::from(cols) * usize::from(rows)],
            cols,
            rows,
        }
    }

    /// Screen width in columns.
    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Screen height in rows.
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// `(cols, rows)`.
    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn index(&self, col: u16, row: u16) -> usize {
        usize::from(row) * usize::from(self.cols) + usize::from(col)
    }

    /// Get a cell by position.
    pub fn get(&self, col: u16, row: u16) -> Option<&Cell> {
        if col < self.cols && row < self.rows {
            Some(&self.cells[self.index(col, row)])
        } else {
            None
        }
    }

    /// Set a cell; out-of-bounds writes are ignored.
    pub fn set(&mut self, col: u16, row: u16, cell: Cell) {
        if col < self.cols && row < self.rows {
            let idx = self.index(col, row);
            self.cells[idx] = cell;
        }
    }

    /// Get a row of cells as a slice.
    pub fn row(&self, row: u16) -> Option<&[Cell]> {
        if row < self.rows {
            let start = self.index(0, row);
            Some(&self.cells[start..start + usize::from(self.cols)])
        } else {
            None
        }
    }

    /// Set every cell to `blank`.
    pub fn fill(&mut self, blank: Cell) {
        self.cells.fill(blank);
    }

    /// Set every cell of one row to `blank`.
    pub fn fill_row(&mut self, row: u16, blank: Cell) {
        self.fill_range(row, 0, self.cols, blank);
    }

    /// Set cells `[from, to)` of one row to `blank`, clamped to the width.
    pub fn fill_range(&mut self, row: u16, from: u16, to: u16, blank: Cell) {
        if row >= self.rows {
            return;
        }
        let to = to.min(self.cols);
        if from >= to {
            return;
        }
        let start = self.index(from, row);
        let end = self.index(to, row);
        self.cells[start..end].fill(blank);
    }

    /// Copy of this screen at a new size.
    ///
    /// The overlapping top-left rectangle is preserved; everything else is
    /// `blank`.
    pub fn resized(&self, new_cols: u16, new_rows: u16, blank: Cell) -> Screen {
        let mut next = Screen::filled(new_cols, new_rows, blank);
        let copy_cols = usize::from(self.cols.min(new_cols));
        for row in 0..self.rows.min(new_rows) {
            let src = self.index(0, row);
            let dst = next.index(0, row);
            next.cells[dst..dst + copy_cols].copy_from_slice(&self.cells[src..src + copy_cols]);
        }
        next
    }

    /// Scroll rows `top..=bottom` up by `n`, blanking the vacated bottom rows.
    pub fn scroll_up_region(&mut self, n: u16, top: u16, bottom: u16, blank: Cell) {
        if n == 0 || top > bottom || bottom >= self.rows {
            return;
        }
        let n = n.min(bottom - top + 1);
        let cols = usize::from(self.cols);
        let start = self.index(0, top);
        let end = self.index(0, bottom) + cols;
        self.cells[start..end].rotate_left(usize::from(n) * cols);
        for row in (bottom + 1 - n)..=bottom {
            self.fill_row(row, blank);
        }
    }

    /// Scroll rows `top..=bottom` down by `n`, blanking the vacated top rows.
    pub fn scroll_down_region(&mut self, n: u16, top: u16, bottom: u16, blank: Cell) {
        if n == 0 || top > bottom || bottom >= self.rows {
            return;
        }
        let n = n.min(bottom - top + 1);
        let cols = usize::from(self.cols);
        let start = self.index(0, top);
        let end = self.index(0, bottom) + cols;
        self.cells[start..end].rotate_right(usize::from(n) * cols);
        for row in top..top + n {
            self.fill_row(row, blank);
        }
    }

    /// Iterator over all cells with their `(col, row)` positions.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16, &Cell)> {
        let cols = usize::from(self.cols.max(1));
        self.cells.iter().enumerate().map(move |(idx, cell)| {
            let row = (idx / cols) as u16;
            let col = (idx % cols) as u16;
            (col, row, cell)
        })
    }

    /// Text of one row, trailing blanks included.
    pub fn row_text(&self, row: u16) -> String {
        self.row(row)
            .map(|cells| cells.iter().map(|c| c.ch).collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// Tests
// =============================================================================

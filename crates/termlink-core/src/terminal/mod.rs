//! Terminal display model for termlink.
//!
//! This module provides:
//! - Styled cells and the flat screen grid
//! - The screen buffer (cursor, scroll region, pen)
//! - A hand-written escape-sequence interpreter
//! - The thread-safe display engine that packages both

mod buffer;
mod engine;
mod interpreter;
mod screen;

pub use buffer::{Cursor, EraseMode, ScreenBuffer, ScrollRegion};
pub use engine::{Snapshot, TerminalEngine};
pub use interpreter::{Interpreter, State};
pub use screen::{Attributes, Cell, Color, ColorRole, Screen};

//! Terminal display engine.
//!
//! Packages a [`ScreenBuffer`] and its [`Interpreter`] behind one
//! reader/writer lock: rendering takes the write side, every accessor the
//! read side, so any number of readers can copy the screen concurrently.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::buffer::{Cursor, ScreenBuffer};
use super::interpreter::Interpreter;
use super::screen::Screen;

/// Screen contents and cursor captured under one read lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub screen: Screen,
    pub cursor: Cursor,
}

#[derive(Debug)]
struct EngineState {
    buffer: ScreenBuffer,
    interpreter: Interpreter,
}

/// Thread-safe terminal emulator.
#[derive(Debug)]
pub struct TerminalEngine {
    state: RwLock<EngineState>,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl TerminalEngine {
    /// Create an engine. Zero dimensions are raised to 1.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            state: RwLock::new(EngineState {
                buffer: ScreenBuffer::new(width, height),
                interpreter: Interpreter::new(),
            }),
        }
    }

    /// Interpret `data`. Malformed input is absorbed, never reported.
    pub fn render(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let mut guard = write_lock(&self.state);
        let EngineState {
            buffer,
            interpreter,
        } = &mut *guard;
        interpreter.feed(buffer, data);
    }

    /// Deep copy of the screen.
    pub fn screen(&self) -> Screen {
        read_lock(&self.state).buffer.screen().clone()
    }

    /// Cursor position as `(x, y)`.
    pub fn cursor(&self) -> (u16, u16) {
        let cursor = read_lock(&self.state).buffer.cursor();
        (cursor.x, cursor.y)
    }

    /// `(width, height)`.
    pub fn size(&self) -> (u16, u16) {
        let state = read_lock(&self.state);
        (state.buffer.width(), state.buffer.height())
    }

    /// Screen and cursor from the same instant.
    pub fn snapshot(&self) -> Snapshot {
        let state = read_lock(&self.state);
        Snapshot {
            screen: state.buffer.screen().clone(),
            cursor: state.buffer.cursor(),
        }
    }

    /// Resize, keeping the overlapping content. Zero dimensions are raised to 1.
    pub fn resize(&self, width: u16, height: u16) {
        write_lock(&self.state).buffer.resize(width, height);
    }

    /// Blank the screen, home the cursor and drop any partial sequence.
    pub fn clear(&self) {
        let mut state = write_lock(&self.state);
        state.buffer.reset();
        state.interpreter = Interpreter::new();
    }
}

// =============================================================================
// Tests
// =============================================================================

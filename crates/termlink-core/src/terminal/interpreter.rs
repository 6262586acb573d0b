//! Escape-sequence interpreter.
//!
//! A byte-at-a-time state machine that mutates a [`ScreenBuffer`]. It never
//! fails: unrecognized or malformed sequences are absorbed and the machine
//! returns to [`State::Normal`].

use tracing::trace;

use super::buffer::{EraseMode, ScreenBuffer};
use super::screen::Color;
use crate::constants::MAX_CSI_PARAMS;

const ESC: u8 = 0x1b;
const BEL: u8 = 0x07;

/// Interpreter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Normal,
    /// Saw ESC.
    Escape,
    /// Inside `ESC [`, accumulating parameters.
    ControlSequence,
    /// Inside `ESC ]`, discarding until BEL or ESC.
    OsCommand,
}

/// Incremental UTF-8 decoder for bytes at or above 0x80.
#[derive(Debug, Clone, Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

enum Decoded {
    Pending,
    Char(char),
    /// The pending sequence was cut short; the current byte was not consumed.
    Interrupted,
}

impl Utf8Decoder {
    fn is_pending(&self) -> bool {
        self.need > 0
    }

    fn clear(&mut self) {
        self.len = 0;
        self.need = 0;
    }

    fn push(&mut self, byte: u8) -> Decoded {
        if self.is_pending() {
            if byte & 0xC0 != 0x80 {
                self.clear();
                return Decoded::Interrupted;
            }
            self.buf[self.len] = byte;
            self.len += 1;
            if self.len < self.need {
                return Decoded::Pending;
            }
            let decoded = std::str::from_utf8(&self.buf[..self.len])
                .ok()
                .and_then(|s| s.chars().next())
                .unwrap_or(char::REPLACEMENT_CHARACTER);
            self.clear();
            return Decoded::Char(decoded);
        }

        let need = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return Decoded::Char(char::REPLACEMENT_CHARACTER),
        };
        self.buf[0] = byte;
        self.len = 1;
        self.need = need;
        Decoded::Pending
    }
}

/// Byte-level escape-sequence state machine.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    state: State,
    params: Vec<u16>,
    params_full: bool,
    utf8: Utf8Decoder,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Feed a chunk of bytes.
    pub fn feed(&mut self, buf: &mut ScreenBuffer, bytes: &[u8]) {
        for &byte in bytes {
            self.advance(buf, byte);
        }
    }

    /// Feed a single byte.
    pub fn advance(&mut self, buf: &mut ScreenBuffer, byte: u8) {
        match self.state {
            State::Normal => self.normal(buf, byte),
            State::Escape => self.escape(buf, byte),
            State::ControlSequence => self.control_sequence(buf, byte),
            State::OsCommand => self.os_command(byte),
        }
    }

    fn normal(&mut self, buf: &mut ScreenBuffer, byte: u8) {
        if self.utf8.is_pending() || byte >= 0x80 {
            match self.utf8.push(byte) {
                Decoded::Pending => return,
                Decoded::Char(ch) => {
                    buf.put_char(ch);
                    return;
                }
                Decoded::Interrupted => {
                    buf.put_char(char::REPLACEMENT_CHARACTER);
                    if byte >= 0x80 {
                        // The interrupting byte may lead a sequence of its own.
                        if let Decoded::Char(ch) = self.utf8.push(byte) {
                            buf.put_char(ch);
                        }
                        return;
                    }
                }
            }
        }

        match byte {
            ESC => self.state = State::Escape,
            b'\r' => buf.carriage_return(),
            b'\n' => buf.newline(),
            0x08 => buf.backspace(),
            b'\t' => buf.tab(),
            BEL | 0x7f => {}
            0x20.. => buf.put_char(char::from(byte)),
            _ => {}
        }
    }

    fn escape(&mut self, buf: &mut ScreenBuffer, byte: u8) {
        self.state = State::Normal;
        match byte {
            b'[' => {
                self.params.clear();
                self.params_full = false;
                self.state = State::ControlSequence;
            }
            b']' => self.state = State::OsCommand,
            b'c' => buf.reset(),
            b'D' => buf.newline(),
            b'M' => buf.reverse_newline(),
            b'7' => buf.save_cursor(),
            b'8' => buf.restore_cursor(),
            other => trace!(byte = other, "ignoring escape sequence"),
        }
    }

    fn control_sequence(&mut self, buf: &mut ScreenBuffer, byte: u8) {
        match byte {
            b'0'..=b'9' => {
                if self.params.is_empty() {
                    self.params.push(0);
                }
                if self.params_full {
                    return;
                }
                if let Some(last) = self.params.last_mut() {
                    *last = last
                        .saturating_mul(10)
                        .saturating_add(u16::from(byte - b'0'));
                }
            }
            b';' => {
                if self.params.is_empty() {
                    self.params.push(0);
                }
                if self.params.len() < MAX_CSI_PARAMS {
                    self.params.push(0);
                } else {
                    self.params_full = true;
                }
            }
            command => {
                self.state = State::Normal;
                self.dispatch(buf, command);
            }
        }
    }

    fn os_command(&mut self, byte: u8) {
        match byte {
            BEL => self.state = State::Normal,
            // ESC both ends the command and starts the next sequence, so a
            // trailing ST (`ESC \`) is absorbed rather than printed.
            ESC => self.state = State::Escape,
            _ => {}
        }
    }

    /// Parameter `index`, or `default` when absent or zero.
    fn param(&self, index: usize, default: u16) -> u16 {
        match self.params.get(index) {
            Some(&value) if value > 0 => value,
            _ => default,
        }
    }

    fn dispatch(&mut self, buf: &mut ScreenBuffer, command: u8) {
        match command {
            b'A' => buf.cursor_up(self.param(0, 1)),
            b'B' => buf.cursor_down(self.param(0, 1)),
            b'C' => buf.cursor_forward(self.param(0, 1)),
            b'D' => buf.cursor_back(self.param(0, 1)),
            b'H' | b'f' => buf.set_position(self.param(0, 1), self.param(1, 1)),
            b'J' => {
                if let Some(mode) = EraseMode::from_param(self.param(0, 0)) {
                    buf.erase_display(mode);
                }
            }
            b'K' => {
                if let Some(mode) = EraseMode::from_param(self.param(0, 0)) {
                    buf.erase_line(mode);
                }
            }
            b'm' => self.select_graphic_rendition(buf),
            b'r' => {
                let height = buf.height();
                buf.set_scroll_region(self.param(0, 1), self.param(1, height));
            }
            other => trace!(
                command = other,
                params = ?self.params,
                "ignoring control sequence"
            ),
        }
    }

    fn select_graphic_rendition(&self, buf: &mut ScreenBuffer) {
        let pen = buf.pen_mut();
        let params: &[u16] = if self.params.is_empty() {
            &[0]
        } else {
            &self.params
        };

        for &code in params {
            match code {
                0 => pen.reset(),
                1 => pen.bold = true,
                4 => pen.underline = true,
                5 => pen.blink = true,
                7 => pen.inverse = true,
                22 => pen.bold = false,
                24 => pen.underline = false,
                25 => pen.blink = false,
                27 => pen.inverse = false,
                30..=37 => pen.fg = Color::Indexed((code - 30) as u8),
                39 => pen.fg = Color::Default,
                40..=47 => pen.bg = Color::Indexed((code - 40) as u8),
                49 => pen.bg = Color::Default,
                _ => trace!(code, "ignoring graphic rendition"),
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::buffer::{Cursor, ScrollRegion};

    fn run(width: u16, height: u16, input: &[u8]) -> ScreenBuffer {
        let mut buf = ScreenBuffer::new(width, height);
        let mut interp = Interpreter::new();
        interp.feed(&mut buf, input);
        buf
    }

    #[test]
    fn clear_and_position() {
        let buf = run(80, 24, b"junk\x1b[2J\x1b[6;6H");
        assert_eq!(buf.cursor(), Cursor::new(5, 5));
        assert!(buf.screen().iter().all(|(_, _, c)| c.is_default()));
    }

    #[test]
    fn eighty_one_chars_wrap() {
        let input: Vec<u8> = (0..81).map(|i| b'a' + (i % 26) as u8).collect();
        let buf = run(80, 2, &input);
        assert_eq!(buf.cursor(), Cursor::new(1, 1));
        let expected: String = input[..80].iter().map(|&b| char::from(b)).collect();
        assert_eq!(buf.screen().row_text(0), expected);
        assert_eq!(buf.screen().get(0, 1).unwrap().ch, char::from(input[80]));
    }

    #[test]
    fn c0_controls() {
        let buf = run(20, 3, b"abc\x08\x08X\tY\rZ\x07");
        assert_eq!(buf.screen().row_text(0), format!("ZXc{}Y{}", " ".repeat(5), " ".repeat(11)));
        assert_eq!(buf.cursor(), Cursor::new(1, 0));

        let buf = run(10, 3, b"ab\ncd");
        assert_eq!(buf.screen().row_text(1), "cd        ");
    }

    #[test]
    fn cursor_movement_defaults_and_zero() {
        let buf = run(10, 10, b"\x1b[5;5H\x1b[A\x1b[0D\x1b[2B\x1b[3C");
        assert_eq!(buf.cursor(), Cursor::new(6, 5));
    }

    #[test]
    fn position_defaults_and_clamps() {
        assert_eq!(run(10, 10, b"\x1b[3;3H\x1b[H").cursor(), Cursor::new(0, 0));
        assert_eq!(run(10, 10, b"\x1b[99;99f").cursor(), Cursor::new(9, 9));
        assert_eq!(run(10, 10, b"\x1b[;4H").cursor(), Cursor::new(3, 0));
    }

    #[test]
    fn erase_line_to_end() {
        let buf = run(8, 1, b"abcdef\x1b[1;3H\x1b[K");
        assert_eq!(buf.screen().row_text(0), "ab      ");
    }

    #[test]
    fn unknown_erase_mode_is_ignored() {
        let buf = run(4, 1, b"abc\x1b[7J\x1b[3K");
        assert_eq!(buf.screen().row_text(0), "abc ");
    }

    #[test]
    fn sgr_sets_and_clears() {
        let buf = run(10, 1, b"\x1b[1;4;7;5;31;42mA\x1b[22;24;27;25;39;49mB\x1b[33mC\x1b[mD");
        let a = buf.screen().get(0, 0).unwrap();
        assert!(a.bold && a.underline && a.inverse && a.blink);
        assert_eq!(a.fg, Color::Indexed(1));
        assert_eq!(a.bg, Color::Indexed(2));

        let b = buf.screen().get(1, 0).unwrap();
        assert!(!b.bold && !b.underline && !b.inverse && !b.blink);
        assert_eq!((b.fg, b.bg), (Color::Default, Color::Default));

        assert_eq!(buf.screen().get(2, 0).unwrap().fg, Color::Indexed(3));
        let d = buf.screen().get(3, 0).unwrap();
        assert_eq!(d.ch, 'D');
        assert_eq!(d.fg, Color::Default);
        assert!(!d.bold);
    }

    #[test]
    fn sgr_unknown_codes_ignored() {
        let buf = run(4, 1, b"\x1b[1;38;5;200mX");
        let cell = buf.screen().get(0, 0).unwrap();
        assert!(cell.bold);
        assert_eq!(cell.fg, Color::Default);
    }

    #[test]
    fn scroll_region_command() {
        let buf = run(5, 10, b"\x1b[3;6r");
        assert_eq!(buf.region(), ScrollRegion { top: 2, bottom: 5 });
        let buf = run(5, 10, b"\x1b[3;6r\x1b[r");
        assert_eq!(buf.region(), ScrollRegion::full(10));
        let buf = run(5, 10, b"\x1b[7;2r");
        assert_eq!(buf.region(), ScrollRegion { top: 6, bottom: 6 });
    }

    #[test]
    fn scrolling_inside_region() {
        let buf = run(3, 4, b"00\r\n11\r\n22\r\n33\x1b[2;3r\x1b[3;1H\n");
        assert_eq!(buf.screen().row_text(0), "00 ");
        assert_eq!(buf.screen().row_text(1), "22 ");
        assert_eq!(buf.screen().row_text(2), "   ");
        assert_eq!(buf.screen().row_text(3), "33 ");
        assert_eq!(buf.cursor(), Cursor::new(0, 2));
    }

    #[test]
    fn escape_commands() {
        let buf = run(4, 4, b"\x1b[2;3H\x1b7\x1b[H\x1b8");
        assert_eq!(buf.cursor(), Cursor::new(2, 1));

        let buf = run(4, 4, b"\x1b[3;3Hab\x1bD");
        assert_eq!(buf.cursor(), Cursor::new(0, 3));

        let buf = run(2, 2, b"ab\x1b[H\x1bM");
        assert_eq!(buf.screen().row_text(0), "  ");
        assert_eq!(buf.screen().row_text(1), "ab");

        let buf = run(4, 2, b"\x1b[1mxy\x1bc");
        assert_eq!(buf.cursor(), Cursor::new(0, 0));
        assert!(buf.screen().iter().all(|(_, _, c)| c.is_default()));
    }

    #[test]
    fn unknown_sequences_return_to_normal() {
        let mut buf = ScreenBuffer::new(10, 1);
        let mut interp = Interpreter::new();
        interp.feed(&mut buf, b"\x1b(");
        assert_eq!(interp.state(), State::Normal);
        interp.feed(&mut buf, b"\x1b[5z");
        assert_eq!(interp.state(), State::Normal);
        interp.feed(&mut buf, b"ok");
        assert_eq!(buf.screen().row_text(0), "ok        ");
    }

    #[test]
    fn os_command_is_discarded() {
        let buf = run(10, 1, b"\x1b]0;title\x07hi");
        assert_eq!(buf.screen().row_text(0), "hi        ");
        let buf = run(10, 1, b"\x1b]2;title\x1b\\hi");
        assert_eq!(buf.screen().row_text(0), "hi        ");
    }

    #[test]
    fn state_is_kept_across_chunks() {
        let mut buf = ScreenBuffer::new(10, 10);
        let mut interp = Interpreter::new();
        interp.feed(&mut buf, b"\x1b[");
        assert_eq!(interp.state(), State::ControlSequence);
        interp.feed(&mut buf, b"4;");
        interp.feed(&mut buf, b"7H");
        assert_eq!(buf.cursor(), Cursor::new(6, 3));
    }

    #[test]
    fn hostile_parameters_are_bounded() {
        let mut input = b"\x1b[".to_vec();
        input.extend(std::iter::repeat_n(b'9', 50));
        input.extend(std::iter::repeat_n(b';', 1000));
        input.extend_from_slice(b"H");
        let buf = run(10, 10, &input);
        assert_eq!(buf.cursor(), Cursor::new(0, 9));
    }

    #[test]
    fn utf8_is_decoded() {
        let buf = run(4, 1, "é→".as_bytes());
        assert_eq!(buf.screen().get(0, 0).unwrap().ch, 'é');
        assert_eq!(buf.screen().get(1, 0).unwrap().ch, '→');
        assert_eq!(buf.cursor(), Cursor::new(2, 0));
    }

    #[test]
    fn invalid_utf8_writes_replacement() {
        let buf = run(5, 1, b"\xffa\xc3b");
        assert_eq!(buf.screen().row_text(0), "\u{FFFD}a\u{FFFD}b ");
    }

    #[test]
    fn interrupted_utf8_resumes_on_new_lead_byte() {
        let buf = run(4, 1, b"\xc3\xc3\xa9");
        assert_eq!(buf.screen().row_text(0), "\u{FFFD}\u{e9}  ");
        assert_eq!(buf.cursor(), Cursor::new(2, 0));

        let buf = run(4, 1, b"\xe2\x86\xc3\xa9x");
        assert_eq!(buf.screen().row_text(0), "\u{FFFD}\u{e9}x ");
    }

    #[test]
    fn delete_is_ignored() {
        let buf = run(4, 1, b"a\x7fb");
        assert_eq!(buf.screen().row_text(0), "ab  ");
        assert_eq!(buf.cursor(), Cursor::new(2, 0));
    }
}

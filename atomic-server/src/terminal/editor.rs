//! Line editor state machine
//!
//! Interprets keystrokes while a field is being captured. Every edit renders
//! only what changed: cursor motions for movement, and the buffer suffix
//! bracketed by save/restore cursor for insertions and deletions.

use std::fmt::Write;

const SAVE_CURSOR: &str = "\x1b[s";
const RESTORE_CURSOR: &str = "\x1b[u";

/// Insert key as sent by some terminals
pub const INSERT_KEY: char = '\u{F746}';

/// How a typed character lands when the cursor is inside the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    /// Shift the remainder right
    #[default]
    Insert,
    /// Replace the character under the cursor
    Overwrite,
}

impl EditMode {
    fn toggled(self) -> Self {
        match self {
            Self::Insert => Self::Overwrite,
            Self::Overwrite => Self::Insert,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    Delete,
    Insert,
}

/// Result of feeding a chunk to the editor
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Feed {
    /// Bytes to render (already gated on echo)
    pub render: String,
    /// Completed line, when the chunk contained a carriage return
    pub submitted: Option<String>,
}

/// Editable input field
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
    max_len: usize,
    mode: EditMode,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current buffer contents
    pub fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// Maximum number of characters (0 = unlimited)
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len;
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Empty the buffer and home the cursor
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    /// Interpret a chunk of keystrokes. Processing stops at the first `\r`;
    /// whatever follows it in the chunk is discarded.
    pub fn feed(&mut self, chunk: &str, echo: bool) -> Feed {
        let mut out = Feed::default();
        let mut chars = chunk.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\r' => {
                    self.cursor = 0;
                    out.submitted = Some(self.buffer.drain(..).collect());
                    break;
                }
                '\x1b' => {
                    if let Some(key) = parse_escape(&mut chars) {
                        self.apply_key(key, &mut out.render);
                    }
                }
                INSERT_KEY => self.mode = self.mode.toggled(),
                '\x7f' | '\x08' => self.backspace(&mut out.render),
                '\x01' => self.apply_key(Key::Home, &mut out.render),
                '\x05' => self.apply_key(Key::End, &mut out.render),
                c if c.is_control() => {}
                c => self.insert(c, &mut out.render),
            }
        }

        if !echo {
            out.render.clear();
        }
        out
    }

    fn apply_key(&mut self, key: Key, render: &mut String) {
        match key {
            Key::Up | Key::Down => {}
            Key::Right => {
                if self.cursor < self.buffer.len() {
                    self.cursor += 1;
                    render.push_str("\x1b[1C");
                }
            }
            Key::Left => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    render.push_str("\x1b[1D");
                }
            }
            Key::Home => {
                if self.cursor > 0 {
                    let _ = write!(render, "\x1b[{}D", self.cursor);
                    self.cursor = 0;
                }
            }
            Key::End => {
                let len = self.buffer.len();
                if self.cursor < len {
                    let _ = write!(render, "\x1b[{}C", len - self.cursor);
                    self.cursor = len;
                }
            }
            Key::Delete => {
                if self.cursor < self.buffer.len() {
                    self.buffer.remove(self.cursor);
                    self.render_suffix(render, true);
                }
            }
            Key::Insert => self.mode = self.mode.toggled(),
        }
    }

    fn backspace(&mut self, render: &mut String) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        self.buffer.remove(self.cursor);
        render.push('\x08');
        self.render_suffix(render, true);
    }

    fn insert(&mut self, c: char, render: &mut String) {
        let at_end = self.cursor == self.buffer.len();
        let grows = at_end || self.mode == EditMode::Insert;
        if grows && self.max_len > 0 && self.buffer.len() >= self.max_len {
            return;
        }

        if at_end {
            self.buffer.push(c);
            self.cursor += 1;
            render.push(c);
            return;
        }

        match self.mode {
            EditMode::Insert => {
                self.buffer.insert(self.cursor, c);
                self.cursor += 1;
                render.push(c);
                self.render_suffix(render, false);
            }
            EditMode::Overwrite => {
                self.buffer[self.cursor] = c;
                self.cursor += 1;
                render.push(c);
            }
        }
    }

    /// Redraw from the cursor to the end of the buffer without moving the
    /// cursor. `erase` blanks the cell freed by a deletion.
    fn render_suffix(&self, render: &mut String, erase: bool) {
        render.push_str(SAVE_CURSOR);
        render.extend(&self.buffer[self.cursor..]);
        if erase {
            render.push(' ');
        }
        render.push_str(RESTORE_CURSOR);
    }
}

/// Parse the remainder of an escape sequence (the ESC is already consumed).
/// Returns `None` for sequences that are malformed, incomplete, or not
/// bound to an editing key; their bytes are consumed either way.
fn parse_escape<I>(chars: &mut std::iter::Peekable<I>) -> Option<Key>
where
    I: Iterator<Item = char>,
{
    match chars.next()? {
        '[' => {
            // Linux console function keys: ESC [ [ <letter>
            if chars.next_if_eq(&'[').is_some() {
                chars.next()?;
                return None;
            }
            parse_csi(chars)
        }
        'O' => match chars.next()? {
            'A' => Some(Key::Up),
            'B' => Some(Key::Down),
            'C' => Some(Key::Right),
            'D' => Some(Key::Left),
            'H' => Some(Key::Home),
            'F' => Some(Key::End),
            _ => None,
        },
        _ => None,
    }
}

/// Consume a control sequence body: parameter bytes (0x30-0x3F), then
/// intermediate bytes (0x20-0x2F), then one final byte (0x40-0x7E). Any
/// other character aborts the sequence and is consumed with it.
fn parse_csi<I>(chars: &mut std::iter::Peekable<I>) -> Option<Key>
where
    I: Iterator<Item = char>,
{
    let mut params = String::new();
    while let Some(c) = chars.next_if(|c| ('\x30'..='\x3f').contains(c)) {
        params.push(c);
    }
    let mut intermediates = false;
    while chars.next_if(|c| ('\x20'..='\x2f').contains(c)).is_some() {
        intermediates = true;
    }
    match chars.next()? {
        c @ '\x40'..='\x7e' if !intermediates => csi_key(&params, c),
        _ => None,
    }
}

fn csi_key(params: &str, final_byte: char) -> Option<Key> {
    match (params, final_byte) {
        ("", 'A') => Some(Key::Up),
        ("", 'B') => Some(Key::Down),
        ("", 'C') => Some(Key::Right),
        ("", 'D') => Some(Key::Left),
        ("", 'H') => Some(Key::Home),
        ("", 'F') => Some(Key::End),
        ("1", '~') | ("7", '~') => Some(Key::Home),
        ("4", '~') | ("8", '~') => Some(Key::End),
        ("2", '~') => Some(Key::Insert),
        ("3", '~') => Some(Key::Delete),
        _ => None,
    }
}

//! Per-connection terminal
//!
//! Owns the render state of one connection: output encoding, pacing, echo,
//! the capture flag and the line editor. Script code calls the output and
//! blocking-read methods from its own thread while the session reader feeds
//! [`Terminal::input`]; all of it goes through `&self`.

mod codepage;
mod decode;
mod editor;
mod output;
mod rendezvous;

pub use codepage::{decode_cp437, OutputMode};
pub use decode::Utf8Decoder;
pub use editor::{EditMode, Feed, LineEditor, INSERT_KEY};
pub use output::{run_writer, OutputSink, Outgoing};
pub use rendezvous::Rendezvous;

use std::path::Path;
use std::time::Duration;

use base64::Engine as _;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use atomic_utils::{AtomicError, Result};

use crate::config::TerminalConfig;

/// Clear screen and home the cursor
pub const CLEAR: &str = "\x1b[2J\x1b[0;0H";
/// Clear screen only
pub const CLS: &str = "\x1b[2J";
/// Full terminal reset
pub const RESET: &str = "\x1bc";
/// Switch to the alternate screen buffer
pub const ENTER_SCREEN: &str = "\x1b[?1049h\x1b[H";
/// Back to the main screen buffer
pub const EXIT_SCREEN: &str = "\x1b[?1049l";

#[derive(Debug)]
struct State {
    mode: OutputMode,
    delay: Duration,
    unmapped: u8,
    echo: bool,
    capture: bool,
    editor: LineEditor,
    input: Utf8Decoder,
}

/// Terminal bound to one connection's output queue
#[derive(Debug)]
pub struct Terminal {
    sink: OutputSink,
    state: Mutex<State>,
    /// (cols, rows), read and written together
    size: Mutex<(u16, u16)>,
    submit: Rendezvous<String>,
    input_timeout: Option<Duration>,
}

impl Terminal {
    pub fn new(sink: OutputSink, config: &TerminalConfig) -> Self {
        let mode = OutputMode::parse(&config.output_mode).unwrap_or_else(|| {
            warn!(mode = %config.output_mode, "Unknown output mode, using UTF8");
            OutputMode::Utf8
        });

        let mut editor = LineEditor::new();
        editor.set_max_len(config.max_input_length);

        Self {
            sink,
            state: Mutex::new(State {
                mode,
                delay: Duration::from_millis(config.output_delay_ms),
                unmapped: config.unmapped_byte,
                echo: false,
                capture: false,
                editor,
                input: Utf8Decoder::new(),
            }),
            size: Mutex::new((config.default_cols, config.default_rows)),
            submit: Rendezvous::new(),
            input_timeout: match config.input_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    // ==================== Output ====================

    /// Write text through the current encoding and pacing
    pub fn write(&self, text: &str) {
        let state = self.state.lock();
        self.emit(&state, text);
    }

    pub fn write_char(&self, c: char) {
        let mut buf = [0u8; 4];
        self.write(c.encode_utf8(&mut buf));
    }

    /// Write one byte as-is, honoring pacing
    pub fn write_byte(&self, b: u8) {
        let state = self.state.lock();
        let unit = Bytes::copy_from_slice(&[b]);
        if state.delay.is_zero() {
            self.sink.send(Outgoing::Data(unit));
        } else {
            self.sink.send(Outgoing::Paced {
                units: vec![unit],
                delay: state.delay,
            });
        }
    }

    /// Relay output of an external process. In UTF-8 mode the bytes pass
    /// through untouched; in code-page mode they are decoded and re-encoded.
    pub fn write_process_output(&self, decoder: &mut Utf8Decoder, data: &[u8]) {
        let state = self.state.lock();
        if state.mode == OutputMode::Utf8 && state.delay.is_zero() {
            self.sink.data(Bytes::copy_from_slice(data));
            return;
        }
        let text = decoder.decode(data);
        self.emit(&state, &text);
    }

    /// Write a CP437 file (ANSI art) through the current encoding.
    /// Returns the number of bytes read.
    pub fn write_from_file(&self, path: &Path) -> Result<usize> {
        let bytes = std::fs::read(path).map_err(|e| AtomicError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.write(&decode_cp437(&bytes));
        Ok(bytes.len())
    }

    fn emit(&self, state: &State, text: &str) {
        if text.is_empty() {
            return;
        }

        if state.delay.is_zero() {
            self.sink.data(state.mode.encode(text, state.unmapped));
            return;
        }

        let units = text
            .chars()
            .map(|c| {
                let mut buf = [0u8; 4];
                Bytes::from(state.mode.encode(c.encode_utf8(&mut buf), state.unmapped))
            })
            .collect();
        self.sink.send(Outgoing::Paced {
            units,
            delay: state.delay,
        });
    }

    /// Clear the screen and home the cursor
    pub fn clear(&self) {
        self.write(CLEAR);
    }

    /// Clear the screen leaving the cursor where it is
    pub fn cls(&self) {
        self.write(CLS);
    }

    pub fn reset_screen(&self) {
        self.write(RESET);
    }

    pub fn enter_screen(&self) {
        self.write(ENTER_SCREEN);
    }

    pub fn exit_screen(&self) {
        self.write(EXIT_SCREEN);
    }

    pub fn move_cursor(&self, row: i64, col: i64) {
        self.write(&format!("\x1b[{};{}H", row, col));
    }

    /// Write `text` at an absolute position, clipped to the columns left on
    /// that row
    pub fn print(&self, row: i64, col: i64, text: &str) {
        let (cols, _) = self.size();
        let room = i64::from(cols) + 1 - col;
        if room <= 0 {
            return;
        }

        let clipped: String = text.chars().take(room as usize).collect();
        if clipped.is_empty() {
            return;
        }
        self.write(&format!("\x1b[{};{}f{}", row, col, clipped));
    }

    /// Write each line of `text` starting at (row, col), one row per line
    pub fn print_multiple_lines(&self, row: i64, col: i64, text: &str) {
        let text = text.replace('\r', "");
        for (i, line) in text.split('\n').enumerate() {
            self.move_cursor(row + i as i64, col);
            self.write(line);
        }
    }

    /// Draw a single-line border with its top-left corner at (row, col)
    pub fn draw_box(&self, row: i64, col: i64, width: i64, height: i64) {
        let inner = "─".repeat((width - 2).max(0) as usize);

        self.move_cursor(row, col);
        self.write(&format!("┌{}┐", inner));

        for i in 0..(height - 2).max(0) {
            self.move_cursor(row + i + 1, col);
            self.write("│");
            self.move_cursor(row + i + 1, col + width - 1);
            self.write("│");
        }

        self.move_cursor(row + height - 1, col);
        self.write(&format!("└{}┘", inner));
    }

    /// Send an image using the iTerm2 inline image protocol
    pub fn inline_image(&self, path: &Path) -> Result<()> {
        let content = std::fs::read(path).map_err(|e| AtomicError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        self.write(&format!(
            "\x1b]1337;File=inline=1;preserveAspectRatio=1:{}\x07",
            encoded
        ));
        Ok(())
    }

    // ==================== Configuration ====================

    pub fn set_echo(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    pub fn echo(&self) -> bool {
        self.state.lock().echo
    }

    /// Switch output encoding by name. Unknown names fall back to UTF-8.
    pub fn set_output_mode(&self, name: &str) {
        let mode = OutputMode::parse(name).unwrap_or_else(|| {
            warn!(mode = %name, "Invalid output mode, using UTF8");
            OutputMode::Utf8
        });
        debug!(mode = %mode, "Output mode set");
        self.state.lock().mode = mode;
    }

    pub fn output_mode(&self) -> OutputMode {
        self.state.lock().mode
    }

    pub fn get_output_mode(&self) -> &'static str {
        self.output_mode().name()
    }

    /// Maximum characters accepted by a capture (0 = unlimited)
    pub fn set_input_limit(&self, limit: usize) {
        self.state.lock().editor.set_max_len(limit);
    }

    pub fn set_output_delay(&self, ms: u64) {
        self.state.lock().delay = Duration::from_millis(ms);
    }

    /// Current (cols, rows)
    pub fn size(&self) -> (u16, u16) {
        *self.size.lock()
    }

    pub fn set_size(&self, cols: u16, rows: u16) {
        *self.size.lock() = (cols, rows);
    }

    // ==================== Input ====================

    /// Block until the user submits a line, echoing what they type
    pub fn get_field(&self) -> Result<String> {
        self.capture(true)
    }

    /// Block until the user submits a line, without echo
    pub fn get_password(&self) -> Result<String> {
        self.capture(false)
    }

    fn capture(&self, echo: bool) -> Result<String> {
        {
            let mut state = self.state.lock();
            if state.capture {
                return Err(AtomicError::CaptureBusy);
            }
            if self.submit.is_closed() {
                return Err(AtomicError::SessionClosed);
            }
            self.submit.discard();
            state.echo = echo;
            state.capture = true;
            state.editor.clear();
        }

        let result = self.submit.wait(self.input_timeout);

        let mut state = self.state.lock();
        state.capture = false;
        state.echo = false;
        state.editor.clear();
        result
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().capture
    }

    /// Current edit buffer
    pub fn buffer(&self) -> String {
        self.state.lock().editor.text()
    }

    pub fn cursor(&self) -> usize {
        self.state.lock().editor.cursor()
    }

    /// Feed raw transport bytes, decoding UTF-8 across chunk boundaries
    pub fn input_bytes(&self, data: &[u8]) {
        let text = self.state.lock().input.decode(data);
        if !text.is_empty() {
            self.input(&text);
        }
    }

    /// Interpret a chunk of input. Outside a capture the chunk is only
    /// echoed (when echo is on); during a capture it drives the line editor.
    pub fn input(&self, chunk: &str) {
        let mut state = self.state.lock();

        if !state.capture {
            if state.echo {
                self.emit(&state, chunk);
            }
            return;
        }

        let echo = state.echo;
        let feed = state.editor.feed(chunk, echo);
        self.emit(&state, &feed.render);

        if let Some(line) = feed.submitted {
            state.capture = false;
            state.echo = false;
            drop(state);
            self.submit.submit(line);
        }
    }

    /// Release a blocked capture with `SessionClosed`
    pub fn close_input(&self) {
        self.submit.close();
    }

    /// Queue a transport close after pending output
    pub fn close(&self) {
        self.sink.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub(crate) fn test_terminal() -> (Arc<Terminal>, UnboundedReceiver<Outgoing>) {
        let (sink, rx) = OutputSink::channel();
        let terminal = Terminal::new(sink, &TerminalConfig::default());
        (Arc::new(terminal), rx)
    }

    /// Concatenate everything queued so far
    pub(crate) fn drain(rx: &mut UnboundedReceiver<Outgoing>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            match item {
                Outgoing::Data(data) => out.extend_from_slice(&data),
                Outgoing::Paced { units, .. } => {
                    for unit in units {
                        out.extend_from_slice(&unit);
                    }
                }
                Outgoing::Close => {}
            }
        }
        out
    }

    fn wait_for_capture(terminal: &Terminal) {
        for _ in 0..200 {
            if terminal.is_capturing() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("capture never started");
    }

    #[test]
    fn test_echo_without_capture_leaves_buffer() {
        let (terminal, mut rx) = test_terminal();
        terminal.set_echo(true);

        terminal.input("ab");

        assert_eq!(drain(&mut rx), b"ab");
        assert_eq!(terminal.buffer(), "");
        assert_eq!(terminal.cursor(), 0);
    }

    #[test]
    fn test_no_echo_without_capture_writes_nothing() {
        let (terminal, mut rx) = test_terminal();
        terminal.input("\x1b[3~abc\x7f");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(terminal.buffer(), "");
    }

    #[test]
    fn test_get_field_returns_line() {
        let (terminal, mut rx) = test_terminal();

        let reader = {
            let terminal = Arc::clone(&terminal);
            thread::spawn(move || terminal.get_field())
        };
        wait_for_capture(&terminal);
        assert!(terminal.echo());

        terminal.input("hi\r");

        assert_eq!(reader.join().unwrap().unwrap(), "hi");
        assert_eq!(terminal.cursor(), 0);
        assert!(!terminal.echo());
        assert!(!terminal.is_capturing());
        assert_eq!(drain(&mut rx), b"hi");
    }

    #[test]
    fn test_input_after_submit_is_not_echoed() {
        let (terminal, mut rx) = test_terminal();

        let reader = {
            let terminal = Arc::clone(&terminal);
            thread::spawn(move || terminal.get_field())
        };
        wait_for_capture(&terminal);

        // Arrives before the capture thread wakes up
        terminal.input("ok\r");
        terminal.input("late");

        assert_eq!(reader.join().unwrap().unwrap(), "ok");
        assert_eq!(drain(&mut rx), b"ok");
        assert_eq!(terminal.buffer(), "");
    }

    #[test]
    fn test_get_password_does_not_echo() {
        let (terminal, mut rx) = test_terminal();

        let reader = {
            let terminal = Arc::clone(&terminal);
            thread::spawn(move || terminal.get_password())
        };
        wait_for_capture(&terminal);

        terminal.input("s3cret\r");

        assert_eq!(reader.join().unwrap().unwrap(), "s3cret");
        assert!(drain(&mut rx).is_empty());
        assert!(!terminal.echo());
    }

    #[test]
    fn test_backspace_on_empty_capture() {
        let (terminal, mut rx) = test_terminal();

        let reader = {
            let terminal = Arc::clone(&terminal);
            thread::spawn(move || terminal.get_field())
        };
        wait_for_capture(&terminal);

        terminal.input("\x7f");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(terminal.buffer(), "");

        terminal.close_input();
        assert!(matches!(
            reader.join().unwrap(),
            Err(AtomicError::SessionClosed)
        ));
    }

    #[test]
    fn test_second_capture_is_busy() {
        let (terminal, _rx) = test_terminal();

        let reader = {
            let terminal = Arc::clone(&terminal);
            thread::spawn(move || terminal.get_field())
        };
        wait_for_capture(&terminal);

        assert!(matches!(terminal.get_field(), Err(AtomicError::CaptureBusy)));

        terminal.input("\r");
        assert_eq!(reader.join().unwrap().unwrap(), "");
    }

    #[test]
    fn test_capture_after_close_fails_fast() {
        let (terminal, _rx) = test_terminal();
        terminal.close_input();
        assert!(matches!(
            terminal.get_password(),
            Err(AtomicError::SessionClosed)
        ));
        assert!(!terminal.is_capturing());
    }

    #[test]
    fn test_capture_timeout() {
        let (sink, _rx) = OutputSink::channel();
        let config = TerminalConfig {
            input_timeout_secs: 1,
            ..TerminalConfig::default()
        };
        let terminal = Terminal::new(sink, &config);

        let result = terminal.get_field();
        assert!(matches!(
            result,
            Err(AtomicError::InputTimeout { seconds: 1 })
        ));
        assert!(!terminal.is_capturing());
    }

    #[test]
    fn test_input_limit() {
        let (terminal, _rx) = test_terminal();
        terminal.set_input_limit(2);

        let reader = {
            let terminal = Arc::clone(&terminal);
            thread::spawn(move || terminal.get_field())
        };
        wait_for_capture(&terminal);

        terminal.input("abc\r");
        assert_eq!(reader.join().unwrap().unwrap(), "ab");
    }

    #[test]
    fn test_input_bytes_split_utf8() {
        let (terminal, mut rx) = test_terminal();
        terminal.set_echo(true);

        let bytes = "é".as_bytes();
        terminal.input_bytes(&bytes[..1]);
        terminal.input_bytes(&bytes[1..]);

        assert_eq!(drain(&mut rx), "é".as_bytes());
    }

    #[test]
    fn test_set_output_mode_bogus_falls_back() {
        let (terminal, _rx) = test_terminal();
        terminal.set_output_mode("cp437");
        assert_eq!(terminal.output_mode(), OutputMode::Cp437);

        terminal.set_output_mode("bogus");
        assert_eq!(terminal.output_mode(), OutputMode::Utf8);
        assert_eq!(terminal.get_output_mode(), "UTF8");
    }

    #[test]
    fn test_code_page_output() {
        let (terminal, mut rx) = test_terminal();
        terminal.set_output_mode("CP437");
        terminal.write("╔═╗");
        assert_eq!(drain(&mut rx), vec![0xC9, 0xCD, 0xBB]);
    }

    #[test]
    fn test_write_char_and_byte() {
        let (terminal, mut rx) = test_terminal();
        terminal.set_output_mode("cp850");
        terminal.write_char('é');
        // Bytes bypass the code page
        terminal.write_byte(0xFF);
        assert_eq!(drain(&mut rx), vec![0x82, 0xFF]);
    }

    #[test]
    fn test_paced_output_is_split_per_char() {
        let (terminal, mut rx) = test_terminal();
        terminal.set_output_delay(5);
        terminal.write("ab");

        match rx.try_recv().unwrap() {
            Outgoing::Paced { units, delay } => {
                assert_eq!(units, vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);
                assert_eq!(delay, Duration::from_millis(5));
            }
            other => panic!("Expected paced output, got {:?}", other),
        }
    }

    #[test]
    fn test_screen_sequences() {
        let (terminal, mut rx) = test_terminal();
        terminal.clear();
        terminal.cls();
        terminal.reset_screen();
        terminal.enter_screen();
        terminal.exit_screen();
        assert_eq!(
            drain(&mut rx),
            b"\x1b[2J\x1b[0;0H\x1b[2J\x1bc\x1b[?1049h\x1b[H\x1b[?1049l"
        );
    }

    #[test]
    fn test_print_clips_to_width() {
        let (terminal, mut rx) = test_terminal();
        terminal.set_size(10, 5);

        terminal.print(2, 8, "hello");
        assert_eq!(drain(&mut rx), b"\x1b[2;8fhel");

        terminal.print(2, 11, "x");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_print_multiple_lines() {
        let (terminal, mut rx) = test_terminal();
        terminal.print_multiple_lines(3, 4, "ab\r\ncd");
        assert_eq!(drain(&mut rx), b"\x1b[3;4Hab\x1b[4;4Hcd");
    }

    #[test]
    fn test_draw_box() {
        let (terminal, mut rx) = test_terminal();
        terminal.draw_box(1, 1, 3, 3);
        let expected = "\x1b[1;1H┌─┐\x1b[2;1H│\x1b[2;3H│\x1b[3;1H└─┘";
        assert_eq!(String::from_utf8(drain(&mut rx)).unwrap(), expected);
    }

    #[test]
    fn test_inline_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        std::fs::write(&path, b"abc").unwrap();

        let (terminal, mut rx) = test_terminal();
        terminal.inline_image(&path).unwrap();
        assert_eq!(
            drain(&mut rx),
            b"\x1b]1337;File=inline=1;preserveAspectRatio=1:YWJj\x07"
        );
    }

    #[test]
    fn test_inline_image_missing_file() {
        let (terminal, _rx) = test_terminal();
        let result = terminal.inline_image(Path::new("/nonexistent/atomic.png"));
        assert!(matches!(result, Err(AtomicError::FileRead { .. })));
    }

    #[test]
    fn test_write_from_file_decodes_cp437() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("art.ans");
        std::fs::write(&path, [0xDB, 0xB0]).unwrap();

        let (terminal, mut rx) = test_terminal();
        assert_eq!(terminal.write_from_file(&path).unwrap(), 2);
        assert_eq!(String::from_utf8(drain(&mut rx)).unwrap(), "█░");
    }

    #[test]
    fn test_process_output_passthrough_in_utf8() {
        let (terminal, mut rx) = test_terminal();
        let mut decoder = Utf8Decoder::new();
        terminal.write_process_output(&mut decoder, &[0xE2, 0x94]);
        assert_eq!(drain(&mut rx), vec![0xE2, 0x94]);
    }

    #[test]
    fn test_process_output_reencoded_in_code_page() {
        let (terminal, mut rx) = test_terminal();
        terminal.set_output_mode("cp850");
        let mut decoder = Utf8Decoder::new();

        let bytes = "ã".as_bytes();
        terminal.write_process_output(&mut decoder, &bytes[..1]);
        terminal.write_process_output(&mut decoder, &bytes[1..]);
        assert_eq!(drain(&mut rx), vec![0xC6]);
    }
}

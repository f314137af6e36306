//! Terminal-emulating capture of streamed progress output.
//!
//! Git prints transfer progress as `Receiving objects:  42% (..)\r` repeated
//! on one line. [`ProgressBuffer`] keeps only what a terminal would show:
//! `\r` moves the cursor back to column 0 and subsequent bytes overwrite the
//! line, `\n` opens a new line. A line that has been opened but not yet
//! written to is not part of the rendered output.

use std::fmt;
use std::io;
use std::sync::Mutex;

#[derive(Debug)]
struct Screen {
    lines: Vec<Vec<u8>>,
    cursor: usize,
}

impl Screen {
    fn new() -> Self {
        Self { lines: vec![Vec::new()], cursor: 0 }
    }

    fn put(&mut self, byte: u8) {
        match byte {
            b'\n' => {
                self.lines.push(Vec::new());
                self.cursor = 0;
            }
            b'\r' => self.cursor = 0,
            c => {
                let last = self.lines.len() - 1;
                let line = &mut self.lines[last];
                if self.cursor < line.len() {
                    line[self.cursor] = c;
                } else {
                    line.push(c);
                }
                self.cursor += 1;
            }
        }
    }

    fn render(&self) -> String {
        let captured = match self.lines.split_last() {
            Some((last, rest)) if last.is_empty() => rest,
            _ => &self.lines[..],
        };
        let joined = captured.join(&b'\n');
        String::from_utf8_lossy(&joined).into_owned()
    }
}

/// Thread-safe, line-structured progress sink.
///
/// Writers and readers may run on different threads: the collector writes
/// while the control plane renders the buffer for status queries.
#[derive(Debug)]
pub struct ProgressBuffer {
    screen: Mutex<Screen>,
}

impl Default for ProgressBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBuffer {
    pub fn new() -> Self {
        Self { screen: Mutex::new(Screen::new()) }
    }

    /// Append raw bytes, interpreting `\r` and `\n`.
    pub fn write_bytes(&self, bytes: &[u8]) {
        let mut screen = self.screen.lock().unwrap_or_else(|e| e.into_inner());
        for &b in bytes {
            screen.put(b);
        }
    }
}

impl fmt::Display for ProgressBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self.screen.lock().unwrap_or_else(|e| e.into_inner()).render();
        f.write_str(&rendered)
    }
}

impl io::Write for &ProgressBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

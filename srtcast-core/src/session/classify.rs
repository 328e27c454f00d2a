//! Engine diagnostic stream handling

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Lines containing these end the session as failed
pub const FAILURE_MARKERS: &[&str] = &["Connection failed", "Error"];

/// Lines containing these mean the endpoint is connected
pub const CONNECT_MARKERS: &[&str] = &["Opening", "Connection established"];

/// Longest line kept before it is split
const MAX_LINE: usize = 64 * 1024;

/// What a diagnostic line says about the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Failure,
    Connected,
    Other,
}

/// Classify one line
///
/// Failure markers are checked first, so a line carrying both kinds (ffmpeg's
/// `Opening ...: Connection failed`) is a failure. A connect-first check
/// would report that line as connected.
pub fn classify(line: &str) -> LineClass {
    if FAILURE_MARKERS.iter().any(|m| line.contains(m)) {
        LineClass::Failure
    } else if CONNECT_MARKERS.iter().any(|m| line.contains(m)) {
        LineClass::Connected
    } else {
        LineClass::Other
    }
}

/// Splits the engine's stderr into lines on `\n` and `\r`
///
/// ffmpeg redraws its progress line with bare carriage returns, so a plain
/// line reader would sit on one ever-growing line.
pub struct DiagnosticReader<R> {
    inner: R,
    pending: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> DiagnosticReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    /// Next non-empty line, `None` at end of stream
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let buf = self.inner.fill_buf().await?;

            if buf.is_empty() {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let line = take_line(&mut self.pending);
                if line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(line));
            }

            if let Some(pos) = buf.iter().position(|&b| b == b'\n' || b == b'\r') {
                self.pending.extend_from_slice(&buf[..pos]);
                self.inner.consume(pos + 1);

                let line = take_line(&mut self.pending);
                if !line.is_empty() {
                    return Ok(Some(line));
                }
                continue;
            }

            let len = buf.len();
            self.pending.extend_from_slice(buf);
            self.inner.consume(len);

            if self.pending.len() >= MAX_LINE {
                // Keep a split multibyte character whole for the next line
                let rest = self.pending.split_off(char_boundary(&self.pending));
                let line = take_line(&mut self.pending);
                self.pending = rest;
                return Ok(Some(line));
            }
        }
    }
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence
fn char_boundary(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for i in (len.saturating_sub(4)..len).rev() {
        let b = bytes[i];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let width = match b {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            _ => 4,
        };
        return if i + width > len { i } else { len };
    }
    len
}

fn take_line(pending: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(pending).trim_end().to_string();
    pending.clear();
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &[u8]) -> Vec<String> {
        let mut reader = DiagnosticReader::new(input);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_failure_wins_over_connect() {
        assert_eq!(classify("Opening 'srt://h:1' for writing"), LineClass::Connected);
        assert_eq!(classify("Connection established"), LineClass::Connected);
        assert_eq!(classify("Opening srt://h:1: Connection failed"), LineClass::Failure);
        assert_eq!(classify("Error opening output"), LineClass::Failure);
        assert_eq!(classify("frame=  10 fps=30"), LineClass::Other);
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        assert_eq!(classify("error concealment"), LineClass::Other);
    }

    #[tokio::test]
    async fn test_splits_on_cr_and_lf() {
        let lines = collect(b"first\nframe=1\rframe=2\r\nlast").await;
        assert_eq!(lines, vec!["first", "frame=1", "frame=2", "last"]);
    }

    #[tokio::test]
    async fn test_long_line_split_keeps_characters_whole() {
        let mut input = vec![b'a'; MAX_LINE - 1];
        input.extend_from_slice("étail\n".as_bytes());

        let mut reader = DiagnosticReader::new(tokio::io::BufReader::with_capacity(1024, &input[..]));
        let first = reader.next_line().await.unwrap().unwrap();
        let second = reader.next_line().await.unwrap().unwrap();

        assert_eq!(first.len(), MAX_LINE - 1);
        assert!(first.bytes().all(|b| b == b'a'));
        assert_eq!(second, "étail");
        assert!(reader.next_line().await.unwrap().is_none());
    }

    #[test]
    fn test_char_boundary() {
        assert_eq!(char_boundary(b"abc"), 3);
        assert_eq!(char_boundary("aé".as_bytes()), 3);
        assert_eq!(char_boundary(&"aé".as_bytes()[..2]), 1);
        assert_eq!(char_boundary(&"a€".as_bytes()[..3]), 1);
        assert_eq!(char_boundary("a€".as_bytes()), 4);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        assert!(collect(b"").await.is_empty());
        assert!(collect(b"\r\n\n").await.is_empty());
    }
}

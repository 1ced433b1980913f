//! Line framing
//!
//! Recovers newline-terminated lines from a transport that delivers bytes in
//! arbitrarily sized chunks. A line is only emitted once its `\n` has been
//! seen; the unterminated tail is carried over to the next chunk.

use tracing::warn;

use super::MAX_LINE_LENGTH;

/// Accumulates chunks and yields complete, trimmed lines
#[derive(Debug, Clone)]
pub struct LineFramer {
    /// Unterminated tail of the stream. Never contains `\n`.
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    utf8_tail: Vec<u8>,
    max_line_len: usize,
    /// Set while dropping the remainder of an overlong line
    discarding: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Create a framer with the default line length limit
    pub fn new() -> Self {
        Self::with_max_line_len(MAX_LINE_LENGTH)
    }

    /// Create a framer that discards lines longer than `max_line_len` bytes
    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            buffer: String::new(),
            utf8_tail: Vec::new(),
            max_line_len: max_line_len.max(1),
            discarding: false,
        }
    }

    /// Feed a chunk of text, returning the lines it completes
    ///
    /// A chunk with no newline only grows the buffer. A chunk ending exactly on
    /// a newline leaves the buffer empty.
    pub fn feed(&mut self, chunk: &str) -> FramedLines {
        let Some(last_newline) = chunk.rfind('\n') else {
            self.append_partial(chunk);
            return FramedLines::empty(self.max_line_len);
        };

        let (complete, tail) = chunk.split_at(last_newline + 1);
        let mut text = std::mem::take(&mut self.buffer);
        text.push_str(complete);
        let skip_first = std::mem::replace(&mut self.discarding, false);
        self.append_partial(tail);

        FramedLines {
            text,
            pos: 0,
            skip_first,
            max_line_len: self.max_line_len,
        }
    }

    /// Feed raw transport bytes
    ///
    /// UTF-8 is decoded in streaming mode: a multi-byte character split across
    /// chunks is held back until it completes. Invalid sequences become U+FFFD.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> FramedLines {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(chunk);

        let mut text = String::with_capacity(bytes.len());
        let mut input = bytes.as_slice();
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = input.split_at(e.valid_up_to());
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            input = &after[len..];
                        }
                        None => {
                            self.utf8_tail = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        self.feed(&text)
    }

    /// The current unterminated fragment
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Discard all buffered state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.utf8_tail.clear();
        self.discarding = false;
    }

    fn append_partial(&mut self, fragment: &str) {
        if self.discarding || fragment.is_empty() {
            return;
        }
        self.buffer.push_str(fragment);
        if self.buffer.len() > self.max_line_len {
            warn!(
                len = self.buffer.len(),
                max = self.max_line_len,
                "discarding overlong line"
            );
            self.buffer.clear();
            self.discarding = true;
        }
    }
}

/// Lines completed by a single [`LineFramer::feed`] call, in arrival order
#[derive(Debug)]
pub struct FramedLines {
    /// Complete text, always empty or ending in `\n`
    text: String,
    pos: usize,
    /// First line is the remainder of a line already discarded as overlong
    skip_first: bool,
    max_line_len: usize,
}

impl FramedLines {
    fn empty(max_line_len: usize) -> Self {
        Self {
            text: String::new(),
            pos: 0,
            skip_first: false,
            max_line_len,
        }
    }
}

impl Iterator for FramedLines {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let rest = self.text.get(self.pos..)?;
            let newline = rest.find('\n')?;
            let raw = &rest[..newline];
            self.pos += newline + 1;

            if std::mem::take(&mut self.skip_first) {
                continue;
            }
            if raw.len() > self.max_line_len {
                warn!(
                    len = raw.len(),
                    max = self.max_line_len,
                    "discarding overlong line"
                );
                continue;
            }
            return Some(raw.trim().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const STREAM: &str = "J,10,20,B,0\r\n  J,30,40,B,1  \n\nnoise\nJ,é,1,B,0\nJ,5,6,B,1\n";

    fn collect(framer: &mut LineFramer, chunks: &[&[u8]]) -> Vec<String> {
        chunks
            .iter()
            .flat_map(|chunk| framer.feed_bytes(chunk).collect::<Vec<_>>())
            .collect()
    }

    fn expected() -> Vec<String> {
        vec![
            "J,10,20,B,0".to_string(),
            "J,30,40,B,1".to_string(),
            String::new(),
            "noise".to_string(),
            "J,é,1,B,0".to_string(),
            "J,5,6,B,1".to_string(),
        ]
    }

    #[test]
    fn test_single_chunk() {
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, &[STREAM.as_bytes()]), expected());
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_every_two_way_split() {
        let bytes = STREAM.as_bytes();
        for split in 0..=bytes.len() {
            let mut framer = LineFramer::new();
            let (a, b) = bytes.split_at(split);
            assert_eq!(collect(&mut framer, &[a, b]), expected(), "split at {split}");
        }
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let bytes = STREAM.as_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, &chunks), expected());
    }

    #[test]
    fn test_three_byte_chunks() {
        let bytes = STREAM.as_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(3).collect();
        let mut framer = LineFramer::new();
        assert_eq!(collect(&mut framer, &chunks), expected());
    }

    #[test]
    fn test_no_newline_only_grows_buffer() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed("J,1").count(), 0);
        assert_eq!(framer.feed("0,2").count(), 0);
        assert_eq!(framer.pending(), "J,10,2");
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut framer = LineFramer::new();
        framer.feed("abc");
        assert_eq!(framer.feed("").count(), 0);
        assert_eq!(framer.feed_bytes(&[]).count(), 0);
        assert_eq!(framer.pending(), "abc");
    }

    #[test]
    fn test_chunk_ending_on_newline_resets_buffer() {
        let mut framer = LineFramer::new();
        framer.feed("J,1,");
        let lines: Vec<String> = framer.feed("2,B,0\n").collect();
        assert_eq!(lines, vec!["J,1,2,B,0".to_string()]);
        assert_eq!(framer.pending(), "");
    }

    #[test]
    fn test_whitespace_line_yields_empty_string() {
        let mut framer = LineFramer::new();
        let lines: Vec<String> = framer.feed(" \t \n").collect();
        assert_eq!(lines, vec![String::new()]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        let lines: Vec<String> = framer.feed_bytes(b"J,\xff,1\n").collect();
        assert_eq!(lines, vec!["J,\u{FFFD},1".to_string()]);
    }

    #[test]
    fn test_reset_discards_partial_line() {
        let mut framer = LineFramer::new();
        framer.feed("J,30");
        framer.feed_bytes(&[0xc3]);
        framer.reset();
        assert_eq!(framer.pending(), "");
        let lines: Vec<String> = framer.feed(",40,B,1\n").collect();
        assert_eq!(lines, vec![",40,B,1".to_string()]);
    }

    #[test]
    fn test_overlong_line_dropped_for_any_chunking() {
        let stream = "ok\n0123456789ABCDEF\nJ,1,2,B,0\n";
        let bytes = stream.as_bytes();
        let want = vec!["ok".to_string(), "J,1,2,B,0".to_string()];

        for size in 1..=bytes.len() {
            let mut framer = LineFramer::with_max_line_len(10);
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            assert_eq!(collect(&mut framer, &chunks), want, "chunk size {size}");
        }
    }
}

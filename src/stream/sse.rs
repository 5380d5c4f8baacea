//! SSE line reassembly and canonical frame encoding.
//!
//! Upstream bodies arrive in arbitrary byte chunks: a UTF-8 sequence, a line
//! or a whole event may be split anywhere. [`LineBuffer`] hides that and
//! hands out complete lines only.
use std::ops::ControlFlow;

use memchr::memchr_iter;

use crate::util::push_json_string_escaped;

/// The single terminal frame every normalized stream ends with.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

const DATA_PREFIX: &str = "data: ";
const EVENT_PREFIX: &str = "event: ";

/// Classification of one complete SSE line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Trimmed payload of a `data: ` line.
    Data(&'a str),
    /// `event: ` framing; carries no content.
    Event,
    /// Blank lines, comments and anything unrecognized.
    Other,
}

#[must_use]
pub fn classify_line(line: &str) -> SseLine<'_> {
    if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
        SseLine::Data(payload.trim())
    } else if line.starts_with(EVENT_PREFIX) {
        SseLine::Event
    } else {
        SseLine::Other
    }
}

/// Encode one text fragment as a canonical delta frame:
/// `data: {"choices":[{"delta":{"content":...},"index":0,"finish_reason":null}]}\n\n`.
#[must_use]
pub fn canonical_delta_frame(content: &str) -> String {
    const HEAD: &str = "data: {\"choices\":[{\"delta\":{\"content\":";
    const TAIL: &str = "},\"index\":0,\"finish_reason\":null}]}\n\n";
    let mut out = String::with_capacity(HEAD.len() + TAIL.len() + content.len() + 2);
    out.push_str(HEAD);
    push_json_string_escaped(&mut out, content);
    out.push_str(TAIL);
    out
}

/// Incremental line splitter over a byte stream.
///
/// Incomplete UTF-8 sequences at a chunk end are carried into the next
/// chunk; invalid sequences are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: String,
    read_offset: usize,
    utf8_carry: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.utf8_carry.is_empty() {
            self.decode_into_buffer(chunk);
        } else {
            let mut joined = std::mem::take(&mut self.utf8_carry);
            joined.extend_from_slice(chunk);
            self.decode_into_buffer(&joined);
        }
    }

    fn decode_into_buffer(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }
                    match err.error_len() {
                        None => {
                            self.utf8_carry.extend_from_slice(after);
                            return;
                        }
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[invalid_len..];
                        }
                    }
                }
            }
        }
    }

    /// Feed every complete line (without its `\n` or a trailing `\r`) to `f`
    /// in order. `f` may stop early with `ControlFlow::Break`; lines after the
    /// break are left unconsumed.
    pub fn drain_lines<F>(&mut self, mut f: F) -> ControlFlow<()>
    where
        F: FnMut(&str) -> ControlFlow<()>,
    {
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        let mut flow = ControlFlow::Continue(());
        for rel_pos in memchr_iter(b'\n', &self.buffer.as_bytes()[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            processed_up_to = line_end + 1;
            flow = f(line);
            if flow.is_break() {
                break;
            }
        }

        self.read_offset = processed_up_to;
        self.compact();
        flow
    }

    fn compact(&mut self) {
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Take whatever trails the last newline, including bytes of an
    /// unfinished UTF-8 sequence (lossily decoded).
    pub fn take_remainder(&mut self) -> String {
        if !self.utf8_carry.is_empty() {
            let carry = std::mem::take(&mut self.utf8_carry);
            self.buffer.push_str(&String::from_utf8_lossy(&carry));
        }
        let mut remainder = std::mem::take(&mut self.buffer);
        remainder.drain(..self.read_offset);
        self.read_offset = 0;
        remainder
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len() - self.read_offset + self.utf8_carry.len()
    }
}

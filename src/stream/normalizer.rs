use std::ops::ControlFlow;

use bytes::Bytes;
use smallvec::SmallVec;

use super::sse::{canonical_delta_frame, classify_line, LineBuffer, SseLine, DONE_FRAME};
use crate::protocol::{self, Provider, DONE_SENTINEL};

/// Longest partial line held while waiting for its newline. A stream that
/// exceeds it is terminated.
pub const MAX_PENDING_LINE_BYTES: usize = 1024 * 1024;

/// Canonical frames produced by one `transform` or `flush` call.
pub type Frames = SmallVec<[Bytes; 4]>;

/// Rewrites one provider SSE byte stream into canonical delta frames.
///
/// The terminal frame is emitted at most once and is always the last output.
/// After it has been emitted the normalizer is finished and ignores input.
#[derive(Debug)]
pub struct StreamNormalizer {
    provider: Option<Provider>,
    lines: LineBuffer,
    finished: bool,
    deltas_emitted: usize,
}

impl StreamNormalizer {
    /// `provider` pins the parser; `None` detects the shape per event.
    #[must_use]
    pub fn new(provider: Option<Provider>) -> Self {
        Self {
            provider,
            lines: LineBuffer::new(),
            finished: false,
            deltas_emitted: 0,
        }
    }

    #[must_use]
    pub fn provider(&self) -> Option<Provider> {
        self.provider
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn deltas_emitted(&self) -> usize {
        self.deltas_emitted
    }

    pub fn transform(&mut self, chunk: &[u8]) -> Frames {
        let mut out = Frames::new();
        if self.finished || chunk.is_empty() {
            return out;
        }
        self.lines.push(chunk);

        let provider = self.provider;
        let mut finished = false;
        let mut deltas = 0;
        let _ = self.lines.drain_lines(|line| {
            let flow = handle_line(provider, line, &mut out);
            match flow {
                LineOutcome::Delta => deltas += 1,
                LineOutcome::Done => {
                    finished = true;
                    return ControlFlow::Break(());
                }
                LineOutcome::Skipped => {}
            }
            ControlFlow::Continue(())
        });
        self.deltas_emitted += deltas;
        if finished {
            self.finish();
        } else if self.lines.pending_len() > MAX_PENDING_LINE_BYTES {
            tracing::warn!(
                pending_bytes = self.lines.pending_len(),
                limit = MAX_PENDING_LINE_BYTES,
                "upstream line exceeds limit, ending stream"
            );
            out.push(Bytes::from_static(DONE_FRAME.as_bytes()));
            self.finish();
        }
        out
    }

    /// Process a trailing `data: ` line that never got its newline, then emit
    /// the terminal frame unless it was already emitted. Calling it again is a
    /// no-op.
    pub fn flush(&mut self) -> Frames {
        let mut out = Frames::new();
        if self.finished {
            return out;
        }

        let remainder = self.lines.take_remainder();
        let line = remainder.strip_suffix('\r').unwrap_or(&remainder);
        match handle_line(self.provider, line, &mut out) {
            LineOutcome::Delta => self.deltas_emitted += 1,
            LineOutcome::Done => {
                self.finish();
                return out;
            }
            LineOutcome::Skipped => {}
        }

        out.push(Bytes::from_static(DONE_FRAME.as_bytes()));
        self.finish();
        out
    }

    fn finish(&mut self) {
        self.finished = true;
        // Anything after the sentinel is never read.
        let _ = self.lines.take_remainder();
    }
}

enum LineOutcome {
    Delta,
    Done,
    Skipped,
}

fn handle_line(provider: Option<Provider>, line: &str, out: &mut Frames) -> LineOutcome {
    let SseLine::Data(payload) = classify_line(line) else {
        return LineOutcome::Skipped;
    };
    if payload == DONE_SENTINEL {
        out.push(Bytes::from_static(DONE_FRAME.as_bytes()));
        return LineOutcome::Done;
    }
    if payload.is_empty() {
        return LineOutcome::Skipped;
    }

    let Some(value) = protocol::decode_payload(payload) else {
        return LineOutcome::Skipped;
    };
    let provider = match provider {
        Some(provider) => provider,
        None => match Provider::detect_value(&value) {
            Some(provider) => provider,
            None => return LineOutcome::Skipped,
        },
    };
    match protocol::extract_text(provider, &value) {
        Some(text) => {
            out.push(Bytes::from(canonical_delta_frame(text)));
            LineOutcome::Delta
        }
        None => LineOutcome::Skipped,
    }
}

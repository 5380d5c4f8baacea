pub mod normalizer;
pub mod sse;

pub use normalizer::{Frames, StreamNormalizer};
pub use sse::{canonical_delta_frame, LineBuffer, DONE_FRAME};

use std::convert::Infallible;
use std::fmt::Display;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::protocol::Provider;

/// Pipe an upstream SSE body through a [`StreamNormalizer`].
///
/// Each upstream chunk produces at most one downstream chunk holding every
/// canonical frame it completed. Upstream read errors and reads idle for
/// longer than `idle_timeout` end the stream through `flush`, so the client
/// always sees the terminal frame. Once the terminal frame is out the
/// upstream body is dropped without reading further.
pub fn normalize_sse_stream<S, E>(
    byte_stream: S,
    provider: Option<Provider>,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    futures_util::stream::unfold(
        Some((Box::pin(byte_stream), StreamNormalizer::new(provider))),
        move |state| async move {
            let (mut upstream, mut normalizer) = state?;
            loop {
                let frames = match tokio::time::timeout(idle_timeout, upstream.next()).await {
                    Ok(Some(Ok(chunk))) => normalizer.transform(&chunk),
                    Ok(Some(Err(err))) => {
                        tracing::warn!(error = %err, "upstream stream read failed");
                        normalizer.flush()
                    }
                    Ok(None) => normalizer.flush(),
                    Err(_) => {
                        tracing::warn!(
                            idle_timeout_secs = idle_timeout.as_secs(),
                            "upstream stream idle timeout"
                        );
                        normalizer.flush()
                    }
                };
                if frames.is_empty() {
                    continue;
                }

                let payload = join_frames(frames);
                if normalizer.is_finished() {
                    tracing::debug!(
                        provider = normalizer.provider().map(Provider::as_str),
                        deltas = normalizer.deltas_emitted(),
                        "relay stream finished"
                    );
                    return Some((Ok(payload), None));
                }
                return Some((Ok(payload), Some((upstream, normalizer))));
            }
        },
    )
}

fn join_frames(frames: Frames) -> Bytes {
    if frames.len() == 1 {
        if let Some(frame) = frames.into_iter().next() {
            return frame;
        }
        return Bytes::new();
    }
    let total = frames.iter().map(Bytes::len).sum();
    let mut out = BytesMut::with_capacity(total);
    for frame in &frames {
        out.extend_from_slice(frame);
    }
    out.freeze()
}

use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;

pub(crate) const RETRY_MAX_ATTEMPTS: u32 = 2;
pub(crate) const RETRY_BACKOFF_BASE_MS: u64 = 100;
pub(crate) const RETRY_BACKOFF_MAX_MS: u64 = 1_000;
pub(crate) const RETRY_AFTER_MAX_SECS: u64 = 30;

#[inline]
pub(crate) fn should_retry_upstream_status(status: http::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 503 | 529)
}

/// Transient transport failures worth another attempt. Timeouts are not
/// retried: the caller's time budget is already spent.
#[inline]
pub(crate) fn should_retry_transport_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return false;
    }
    if err.is_connect() {
        return true;
    }
    should_retry_transport_message(&err.to_string())
}

#[inline]
pub(crate) fn should_retry_transport_message(message: &str) -> bool {
    const NEEDLES: [&[u8]; 6] = [
        b"connection reset",
        b"connection aborted",
        b"connection refused",
        b"broken pipe",
        b"unexpected eof",
        b"connection closed",
    ];
    let haystack = message.as_bytes();
    NEEDLES
        .iter()
        .any(|needle| contains_ascii_case_insensitive(haystack, needle))
}

#[inline]
fn contains_ascii_case_insensitive(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|window| window.eq_ignore_ascii_case(needle))
}

#[inline]
pub(crate) fn retry_backoff_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.min(10);
    Duration::from_millis(
        RETRY_BACKOFF_BASE_MS
            .saturating_mul(multiplier)
            .min(RETRY_BACKOFF_MAX_MS),
    )
}

#[inline]
pub(crate) fn retry_delay(headers: &http::HeaderMap, attempt: u32) -> Duration {
    parse_retry_after_delay(headers).unwrap_or_else(|| retry_backoff_delay(attempt))
}

/// `Retry-After` as delta-seconds or an HTTP date, capped at
/// [`RETRY_AFTER_MAX_SECS`].
pub(crate) fn parse_retry_after_delay(headers: &http::HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds.min(RETRY_AFTER_MAX_SECS)));
    }

    let target = httpdate::parse_http_date(raw).ok()?;
    let delay = target.duration_since(SystemTime::now()).unwrap_or_default();
    Some(delay.min(Duration::from_secs(RETRY_AFTER_MAX_SECS)))
}

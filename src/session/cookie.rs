use std::borrow::Cow;

use http::header::COOKIE;
use http::HeaderMap;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Look up one cookie by name across every `Cookie` header.
///
/// Pairs are split on `;` and at the first `=`; values are percent-decoded.
/// Pairs with an empty name or value are ignored, as are values that do not
/// decode.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(parse_cookie_pairs)
        .find_map(|(key, value)| (key == name).then_some(value))
}

/// Parse one `Cookie` header value into decoded `(name, value)` pairs.
pub fn parse_cookie_pairs(header: &str) -> impl Iterator<Item = (&str, String)> + '_ {
    header.split(';').filter_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            return None;
        }
        Some((key, decode_cookie_value(value)?))
    })
}

/// Percent-decode a cookie value. A `%` not followed by two hex digits, or
/// escapes that decode to invalid UTF-8, make the value unusable.
fn decode_cookie_value(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let well_formed = memchr::memchr_iter(b'%', bytes).all(|pos| {
        bytes
            .get(pos + 1..pos + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if !well_formed {
        return None;
    }
    urlencoding::decode(value).ok().map(Cow::into_owned)
}

/// Whether cookies for this request should carry `Secure`.
#[must_use]
pub fn is_secure_request(uri: &http::Uri, headers: &HeaderMap, trust_forwarded: bool) -> bool {
    if uri.scheme() == Some(&http::uri::Scheme::HTTPS) {
        return true;
    }
    if !trust_forwarded {
        return false;
    }
    headers
        .get(FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

/// Render a `Set-Cookie` directive with the session cookie policy:
/// `Max-Age`, `Path=/`, `HttpOnly`, `SameSite=Lax` and `Secure` when asked.
#[must_use]
pub fn build_set_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{name}={}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Lax",
        urlencoding::encode(value)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

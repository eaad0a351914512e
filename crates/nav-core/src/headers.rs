//! Header protocol shared by every layer of the dispatch engine.
//!
//! Redirects, retry directives and background activity all travel as plain
//! headers so they survive transports that cannot carry them natively.

use http::{HeaderMap, StatusCode};

/// Header names used by the navigation protocol.
pub mod header_names {
    /// Real redirect status when the transport status is pinned to the sentinel.
    pub const X_REDIRECT_CODE: &str = "x-redirect-code";
    /// Request-side declaration of how intermediate layers handle redirects.
    pub const X_REDIRECT_POLICY: &str = "x-redirect-policy";
    /// Seconds to wait before polling again.
    pub const RETRY_AFTER: &str = "retry-after";
    /// Marks a cloned retry request.
    pub const X_IS_RETRY: &str = "x-is-retry";
    /// Marks the very first navigation of a session.
    pub const X_IS_STARTUP_FLIGHT: &str = "x-is-startup-flight";
    /// Names the background channel further responses arrive on.
    pub const X_BACKGROUND_ACTIVITY: &str = "x-background-activity";
    /// Identifies the runtime that produced a request.
    pub const X_POWERED_BY: &str = "x-powered-by";
    /// Content negotiation.
    pub const ACCEPT: &str = "accept";
    /// Body media type.
    pub const CONTENT_TYPE: &str = "content-type";
    /// Redirect target.
    pub const LOCATION: &str = "location";
    /// Request cookies.
    pub const COOKIE: &str = "cookie";
    /// Response cookies.
    pub const SET_COOKIE: &str = "set-cookie";
}

/// Header values used by the navigation protocol.
pub mod header_values {
    /// Redirects are resolved manually when they cross SPA boundaries.
    pub const MANUAL_WHEN_CROSS_SPA: &str = "manual-when-cross-spa";
    /// Machine-readable responses.
    pub const APPLICATION_JSON: &str = "application/json";
    /// Runtime identifier sent in `X-Powered-By`.
    pub const POWERED_BY: &str = "webflo";
    /// Flag value for boolean marker headers.
    pub const FLAG_ON: &str = "1";
}

/// Transport-neutral placeholder status that carries a smuggled redirect.
pub const SENTINEL_REDIRECT_CODE: StatusCode = StatusCode::OK;

const BACKGROUND_CHANNEL_PREFIX: &str = "ch:";

/// Parse a `Retry-After` header as whole seconds.
///
/// Values that are not non-negative integers are treated as absent.
pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header_names::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Parse `X-Redirect-Code` into a status code.
pub fn redirect_code(headers: &HeaderMap) -> Option<StatusCode> {
    let raw = headers.get(header_names::X_REDIRECT_CODE)?.to_str().ok()?;
    let code = raw.trim().parse::<u16>().ok()?;
    StatusCode::from_u16(code).ok()
}

/// Build the `X-Background-Activity` value for a port.
pub fn background_channel(port_id: &str) -> String {
    format!("{BACKGROUND_CHANNEL_PREFIX}{port_id}")
}

/// Extract the port identifier from an `X-Background-Activity` value.
pub fn parse_background_channel(value: &str) -> Option<&str> {
    value
        .strip_prefix(BACKGROUND_CHANNEL_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Whether a status asks the navigation layer to follow a redirect.
pub fn is_followable_redirect(status: StatusCode) -> bool {
    status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND
}

/// Whether a marker header is present and set to `1`.
pub fn is_flag_set(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == header_values::FLAG_ON)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_retry_after_integer() {
        assert_eq!(retry_after_secs(&headers(&[("retry-after", "3")])), Some(3));
        assert_eq!(retry_after_secs(&headers(&[("retry-after", " 0 ")])), Some(0));
    }

    #[test]
    fn test_retry_after_non_integer_is_absent() {
        assert_eq!(retry_after_secs(&headers(&[("retry-after", "soon")])), None);
        assert_eq!(retry_after_secs(&headers(&[("retry-after", "-1")])), None);
        assert_eq!(retry_after_secs(&headers(&[("retry-after", "1.5")])), None);
        assert_eq!(retry_after_secs(&HeaderMap::new()), None);
    }

    #[test]
    fn test_redirect_code() {
        let map = headers(&[("x-redirect-code", "302")]);
        assert_eq!(redirect_code(&map), Some(StatusCode::FOUND));
        assert_eq!(redirect_code(&headers(&[("x-redirect-code", "abc")])), None);
        assert_eq!(redirect_code(&headers(&[("x-redirect-code", "42")])), None);
    }

    #[test]
    fn test_background_channel_roundtrip() {
        let value = background_channel("port-7");
        assert_eq!(value, "ch:port-7");
        assert_eq!(parse_background_channel(&value), Some("port-7"));
        assert_eq!(parse_background_channel("ch:"), None);
        assert_eq!(parse_background_channel("port-7"), None);
    }

    #[test]
    fn test_followable_redirects() {
        assert!(is_followable_redirect(StatusCode::MOVED_PERMANENTLY));
        assert!(is_followable_redirect(StatusCode::FOUND));
        assert!(!is_followable_redirect(StatusCode::SEE_OTHER));
        assert!(!is_followable_redirect(StatusCode::OK));
    }

    #[test]
    fn test_flag_set() {
        assert!(is_flag_set(&headers(&[("x-is-retry", "1")]), header_names::X_IS_RETRY));
        assert!(!is_flag_set(&headers(&[("x-is-retry", "0")]), header_names::X_IS_RETRY));
        assert!(!is_flag_set(&HeaderMap::new(), header_names::X_IS_RETRY));
    }
}

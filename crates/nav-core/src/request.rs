//! Requests and their construction input.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::body::Body;
use crate::error::CoreError;
use crate::headers::{header_names, header_values};

/// How a request interacts with the HTTP cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    #[default]
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

/// The request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// A top-level navigation.
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

/// Construction input for a [`Request`].
///
/// Kept around by events and retry handles so a fresh, unconsumed request
/// can be produced at any time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestInit {
    /// Absolute request URL.
    pub url: Option<String>,
    /// Request method.
    pub method: Option<String>,
    /// Headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Buffered body content.
    pub body: Option<Bytes>,
    /// Cache mode.
    pub cache: CacheMode,
    /// Request mode.
    pub mode: RequestMode,
}

impl RequestInit {
    /// A `GET` request for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            method: Some(Method::GET.to_string()),
            ..Self::default()
        }
    }

    /// Set the method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the cache mode.
    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Set the request mode.
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether a header is present (case-insensitive).
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Append a header unless the caller already set one with that name.
    pub fn set_default_header(&mut self, name: &str, value: &str) {
        if !self.has_header(name) {
            self.headers.push((name.to_string(), value.to_string()));
        }
    }

    /// Replace every header with that name by a single value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Validate the input and build a request with a fresh body.
    pub fn materialize(&self) -> Result<Request, CoreError> {
        let raw_url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CoreError::invalid("request is missing a URL"))?;
        let url = Url::parse(raw_url)
            .map_err(|e| CoreError::invalid(format!("invalid URL {raw_url:?}: {e}")))?;

        let raw_method = self
            .method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| CoreError::invalid("request is missing a method"))?;
        let method = Method::from_bytes(raw_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| CoreError::invalid(format!("invalid method {raw_method:?}")))?;

        if self.body.is_some() && (method == Method::GET || method == Method::HEAD) {
            return Err(CoreError::invalid(format!("{method} request cannot have a body")));
        }

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CoreError::invalid(format!("invalid header name {name:?}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| CoreError::invalid(format!("invalid value for header {name:?}")))?;
            headers.append(header_name, header_value);
        }

        let body = match &self.body {
            Some(bytes) => Body::from_bytes(bytes.clone()),
            None => Body::empty(),
        };

        Ok(Request {
            method,
            url,
            headers,
            body,
            cache: self.cache,
            mode: self.mode,
        })
    }
}

/// An inbound navigation or fetch request.
///
/// `Clone` shares the body with the original; use
/// [`Request::rematerialize`] for an independent copy.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
    pub cache: CacheMode,
    pub mode: RequestMode,
}

impl Request {
    /// A bodiless `GET` request.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: Body::empty(),
            cache: CacheMode::Default,
            mode: RequestMode::Cors,
        }
    }

    /// First value of a header, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether a header is present.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// Replace a header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), CoreError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| CoreError::invalid(format!("invalid header name {name:?}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| CoreError::invalid(format!("invalid value for header {name:?}")))?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Whether the request negotiates for JSON exactly.
    pub fn accepts_json(&self) -> bool {
        self.header(header_names::ACCEPT)
            .map(|v| v.trim() == header_values::APPLICATION_JSON)
            .unwrap_or(false)
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// Whether the URL uses an http(s) scheme.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Whether the request targets the same origin as `base`.
    pub fn is_same_origin(&self, base: &Url) -> bool {
        self.url.origin() == base.origin()
    }

    /// Look up a cookie across every `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header_names::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| k.trim() == name)
            .map(|(_, v)| v.trim().to_string())
    }

    /// Copy this request with a fresh body built from `body`.
    pub fn rematerialize(&self, body: Option<Bytes>) -> Request {
        Request {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: body.map(Body::from_bytes).unwrap_or_default(),
            cache: self.cache,
            mode: self.mode,
        }
    }

    /// Rebuild the construction input for this request.
    pub fn to_init(&self, body: Option<Bytes>) -> RequestInit {
        RequestInit {
            url: Some(self.url.to_string()),
            method: Some(self.method.to_string()),
            headers: self
                .headers
                .iter()
                .filter_map(|(n, v)| v.to_str().ok().map(|v| (n.to_string(), v.to_string())))
                .collect(),
            body,
            cache: self.cache,
            mode: self.mode,
        }
    }

    /// Read the body as UTF-8 text, consuming it.
    pub async fn text(&self) -> Result<String, CoreError> {
        let bytes = self.body.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| CoreError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Materialization Tests ===

    #[test]
    fn test_materialize_defaults_to_get() {
        let request = RequestInit::new("https://example.com/a").materialize().unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url.path(), "/a");
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_materialize_missing_url() {
        let err = RequestInit::default().with_method("GET").materialize().unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(msg) if msg.contains("URL")));
    }

    #[test]
    fn test_materialize_missing_method() {
        let init = RequestInit {
            url: Some("https://example.com/".into()),
            ..RequestInit::default()
        };
        let err = init.materialize().unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(msg) if msg.contains("method")));
    }

    #[test]
    fn test_materialize_rejects_relative_url() {
        assert!(RequestInit::new("/relative").materialize().is_err());
    }

    #[test]
    fn test_materialize_rejects_get_body() {
        let err = RequestInit::new("https://example.com/")
            .with_body("x")
            .materialize()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_materialize_normalizes_method_case() {
        let request = RequestInit::new("https://example.com/")
            .with_method("post")
            .with_body("x")
            .materialize()
            .unwrap();
        assert_eq!(request.method, Method::POST);
    }

    #[test]
    fn test_materialize_rejects_bad_header() {
        let err = RequestInit::new("https://example.com/")
            .with_header("bad header", "x")
            .materialize()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    // === Header Tests ===

    #[test]
    fn test_default_header_respects_caller() {
        let mut init = RequestInit::new("https://example.com/").with_header("Accept", "text/html");
        init.set_default_header("accept", "application/json");
        init.set_default_header("x-powered-by", "webflo");
        let request = init.materialize().unwrap();
        assert_eq!(request.header("accept"), Some("text/html"));
        assert_eq!(request.header("x-powered-by"), Some("webflo"));
    }

    #[test]
    fn test_accepts_json() {
        let json = RequestInit::new("https://example.com/")
            .with_header("Accept", "application/json")
            .materialize()
            .unwrap();
        let html = RequestInit::new("https://example.com/")
            .with_header("Accept", "text/html")
            .materialize()
            .unwrap();
        assert!(json.accepts_json());
        assert!(!html.accepts_json());
    }

    #[test]
    fn test_cookie_lookup() {
        let request = RequestInit::new("https://example.com/")
            .with_header("Cookie", "theme=dark; __sessid=abc123")
            .materialize()
            .unwrap();
        assert_eq!(request.cookie("__sessid").as_deref(), Some("abc123"));
        assert_eq!(request.cookie("missing"), None);
    }

    #[test]
    fn test_same_origin() {
        let request = RequestInit::new("https://example.com/a").materialize().unwrap();
        assert!(request.is_same_origin(&Url::parse("https://example.com/").unwrap()));
        assert!(!request.is_same_origin(&Url::parse("https://other.com/").unwrap()));
    }

    // === Rematerialization Tests ===

    #[tokio::test]
    async fn test_rematerialize_gives_fresh_body() {
        let request = RequestInit::new("https://example.com/")
            .with_method("POST")
            .with_body("payload")
            .materialize()
            .unwrap();
        assert_eq!(request.text().await.unwrap(), "payload");
        assert!(request.body.is_consumed());

        let fresh = request.rematerialize(Some(Bytes::from_static(b"payload")));
        assert!(!fresh.body.is_consumed());
        assert_eq!(fresh.text().await.unwrap(), "payload");
    }

    #[test]
    fn test_to_init_roundtrip() {
        let request = RequestInit::new("https://example.com/x")
            .with_header("accept", "application/json")
            .with_cache(CacheMode::NoStore)
            .materialize()
            .unwrap();
        let again = request.to_init(None).materialize().unwrap();
        assert_eq!(again.url, request.url);
        assert_eq!(again.cache, CacheMode::NoStore);
        assert!(again.accepts_json());
    }
}

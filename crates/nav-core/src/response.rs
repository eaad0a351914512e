//! Responses produced by handlers, caches and transports.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::body::Body;
use crate::error::CoreError;
use crate::headers::{header_names, is_followable_redirect};

/// Origin classification of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin.
    #[default]
    Basic,
    /// Permitted cross-origin.
    Cors,
    Default,
    Error,
    Opaque,
    OpaqueRedirect,
}

/// An HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
    pub kind: ResponseType,
    pub url: Option<Url>,
    pub redirected: bool,
}

impl Response {
    /// An empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::empty(),
            kind: ResponseType::Basic,
            url: None,
            redirected: false,
        }
    }

    /// A 200 response with a buffered body.
    pub fn ok(body: impl Into<Body>) -> Self {
        Self::new(StatusCode::OK).with_body(body)
    }

    /// An empty 404 response.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    /// A 500 response carrying an error message.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR).with_body(message.into())
    }

    /// A 200 JSON response.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, CoreError> {
        let body = serde_json::to_vec(value).map_err(|e| CoreError::Decode(e.to_string()))?;
        Ok(Self::ok(body).with_header(header_names::CONTENT_TYPE, "application/json"))
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let _ = self.set_header(name, value);
        self
    }

    /// Set the response type.
    pub fn with_kind(mut self, kind: ResponseType) -> Self {
        self.kind = kind;
        self
    }

    /// Set the response URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
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

    /// Append a header value without replacing existing ones.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), CoreError> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| CoreError::invalid(format!("invalid header name {name:?}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| CoreError::invalid(format!("invalid value for header {name:?}")))?;
        self.headers.append(header_name, header_value);
        Ok(())
    }

    /// First value of a header, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Location` header.
    pub fn location(&self) -> Option<&str> {
        self.header(header_names::LOCATION)
    }

    /// Check if response is successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the status is a redirect the navigation layer follows.
    pub fn is_followable_redirect(&self) -> bool {
        is_followable_redirect(self.status)
    }

    /// Read the body, consuming it.
    pub async fn bytes(&self) -> Result<Bytes, CoreError> {
        self.body.bytes().await
    }

    /// Read the body as UTF-8 text, consuming it.
    pub async fn text(&self) -> Result<String, CoreError> {
        let bytes = self.body.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| CoreError::Decode(e.to_string()))
    }

    /// Decode the body as JSON, consuming it.
    pub async fn json_body<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        let bytes = self.body.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::Decode(e.to_string()))
    }

    /// Buffer the body and return a structurally independent copy.
    ///
    /// `self` keeps a readable body of its own afterwards, so the two
    /// responses never share consumption state.
    pub async fn duplicate(&mut self) -> Result<Response, CoreError> {
        let bytes = self.body.bytes().await?;
        self.body = Body::from_bytes(bytes.clone());
        Ok(Response {
            status: self.status,
            headers: self.headers.clone(),
            body: Body::from_bytes(bytes),
            kind: self.kind,
            url: self.url.clone(),
            redirected: self.redirected,
        })
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Header Tests ===

    #[test]
    fn test_with_header_and_location() {
        let response = Response::new(StatusCode::FOUND).with_header("Location", "/new");
        assert_eq!(response.location(), Some("/new"));
        assert!(response.is_followable_redirect());
    }

    #[test]
    fn test_with_header_skips_invalid() {
        let response = Response::ok("x").with_header("bad name", "v");
        assert!(response.headers.is_empty());
    }

    #[test]
    fn test_append_header_keeps_existing() {
        let mut response = Response::ok("x");
        response.append_header("set-cookie", "a=1").unwrap();
        response.append_header("set-cookie", "b=2").unwrap();
        assert_eq!(response.headers.get_all("set-cookie").iter().count(), 2);
    }

    // === Body Tests ===

    #[tokio::test]
    async fn test_text_consumes_body() {
        let response = Response::ok("hello");
        assert_eq!(response.text().await.unwrap(), "hello");
        assert_eq!(response.text().await, Err(CoreError::BodyConsumed));
    }

    #[tokio::test]
    async fn test_json_roundtrip() {
        let response = Response::json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(response.header("content-type"), Some("application/json"));
        let value: serde_json::Value = response.json_body().await.unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_independent() {
        let mut original = Response::ok("cached").with_header("x-a", "1");
        let copy = original.duplicate().await.unwrap();
        assert!(!original.body.shares_with(&copy.body));
        assert_eq!(copy.text().await.unwrap(), "cached");
        assert_eq!(original.text().await.unwrap(), "cached");
        assert_eq!(copy.header("x-a"), Some("1"));
    }

    #[tokio::test]
    async fn test_duplicate_consumed_fails() {
        let mut original = Response::ok("x");
        original.bytes().await.unwrap();
        assert_eq!(original.duplicate().await.unwrap_err(), CoreError::BodyConsumed);
    }
}

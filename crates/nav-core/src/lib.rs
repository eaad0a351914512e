//! Core primitives for the navigation dispatch engine.
//!
//! This crate provides the fundamental types:
//! - `Request` / `RequestInit` - Inbound requests and their re-materializable input
//! - `Response` - Responses with single-consumption bodies
//! - `Body` - Buffered or streaming bodies, read at most once
//! - `header_names` - The redirect, retry and background header protocol
//! - `StorageHandle` / `StorageSet` - Storage committed into final responses
//! - `SessionArena` - Sessions keyed by the session cookie

mod body;
mod error;
mod headers;
mod request;
mod response;
mod session;
mod storage;

pub use body::*;
pub use error::*;
pub use headers::*;
pub use request::*;
pub use response::*;
pub use session::*;
pub use storage::*;

pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode};
pub use url::Url;

//! Cache write eligibility.

use http::StatusCode;
use nav_core::{Request, Response, ResponseType};

/// Whether a response may be written to the cache.
///
/// Only `GET` requests answered with `200` by a same-origin or permitted
/// cross-origin response are cached.
pub fn is_cacheable(request: &Request, response: &Response) -> bool {
    request.is_get()
        && response.status == StatusCode::OK
        && matches!(response.kind, ResponseType::Basic | ResponseType::Cors)
}

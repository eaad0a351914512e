//! Session arena keyed by the session cookie.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::headers::header_names;
use crate::request::Request;
use crate::response::Response;
use crate::storage::{StorageError, StorageHandle};

/// Cookie carrying the session identifier.
pub const SESSION_COOKIE: &str = "__sessid";

/// Upper bound (exclusive) of the random part of generated identifiers.
const SESSION_ID_SPACE: u32 = 9_000_000;

/// A session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier of the form `~<base36>`.
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(0..SESSION_ID_SPACE);
        Self(format!("~{}", to_base36(n)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// A session looked up from the arena.
///
/// Commits a `Set-Cookie` for identifiers the arena had to mint, once the
/// session has been written.
pub struct SessionHandle<S> {
    id: SessionId,
    data: Arc<S>,
    fresh: bool,
    changed: AtomicBool,
}

impl<S> SessionHandle<S> {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The shared session state.
    pub fn data(&self) -> &Arc<S> {
        &self.data
    }

    /// Whether the identifier was generated for this request.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Write to the session state and mark the session changed.
    pub fn update<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        self.changed.store(true, Ordering::SeqCst);
        f(&self.data)
    }

    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }

    fn new(id: SessionId, data: Arc<S>, fresh: bool) -> Self {
        Self {
            id,
            data,
            fresh,
            changed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> StorageHandle for SessionHandle<S> {
    async fn commit(&self, response: &mut Response) -> Result<(), StorageError> {
        if !self.fresh || !self.is_changed() {
            return Ok(());
        }
        let cookie = format!("{SESSION_COOKIE}={}; Path=/", self.id);
        response
            .append_header(header_names::SET_COOKIE, &cookie)
            .map_err(|e| StorageError::Commit(e.to_string()))
    }

    fn mark_changed(&self) {
        self.changed.store(true, Ordering::SeqCst);
    }
}

/// Sessions shared across requests, looked up by identifier.
pub struct SessionArena<S> {
    sessions: RwLock<HashMap<SessionId, Arc<S>>>,
}

impl<S: Default + Send + Sync> SessionArena<S> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session for a request, creating it on first sight.
    pub fn session_for(&self, request: &Request) -> SessionHandle<S> {
        let (id, fresh) = match request.cookie(SESSION_COOKIE).filter(|v| !v.is_empty()) {
            Some(value) => (SessionId::new(value), false),
            None => (SessionId::generate(), true),
        };

        if let Some(data) = self.get(&id) {
            return SessionHandle::new(id, data, fresh);
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let data = sessions.entry(id.clone()).or_default().clone();
        SessionHandle::new(id, data, fresh)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<S>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<S>> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Default + Send + Sync> Default for SessionArena<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestInit;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Cart {
        items: Mutex<Vec<String>>,
    }

    fn request_with_cookie(cookie: Option<&str>) -> Request {
        let mut init = RequestInit::new("https://example.com/");
        if let Some(cookie) = cookie {
            init = init.with_header("Cookie", cookie);
        }
        init.materialize().unwrap()
    }

    #[test]
    fn test_generate_format() {
        let id = SessionId::generate();
        assert!(id.as_str().starts_with('~'));
        assert!(id.as_str()[1..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_session_from_cookie_is_shared() {
        let arena: SessionArena<Cart> = SessionArena::new();
        let first = arena.session_for(&request_with_cookie(Some("__sessid=abc")));
        first.data().items.lock().unwrap().push("shoe".into());

        let second = arena.session_for(&request_with_cookie(Some("__sessid=abc")));
        assert!(!second.is_fresh());
        assert_eq!(second.id().as_str(), "abc");
        assert_eq!(second.data().items.lock().unwrap().len(), 1);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_session_without_cookie_is_fresh() {
        let arena: SessionArena<Cart> = SessionArena::new();
        let handle = arena.session_for(&request_with_cookie(None));
        assert!(handle.is_fresh());
        assert!(arena.get(handle.id()).is_some());
    }

    #[tokio::test]
    async fn test_fresh_session_sets_cookie() {
        let arena: SessionArena<Cart> = SessionArena::new();
        let handle = arena.session_for(&request_with_cookie(None));
        handle.update(|cart| cart.items.lock().unwrap().push("hat".into()));
        assert!(handle.is_changed());

        let mut response = Response::ok("x");
        handle.commit(&mut response).await.unwrap();
        let cookie = response.header("set-cookie").unwrap();
        assert!(cookie.starts_with("__sessid=~"));
        assert!(cookie.ends_with("; Path=/"));
    }

    #[tokio::test]
    async fn test_untouched_fresh_session_commit_is_noop() {
        let arena: SessionArena<Cart> = SessionArena::new();
        let handle = arena.session_for(&request_with_cookie(None));
        let mut response = Response::ok("x");
        handle.commit(&mut response).await.unwrap();
        assert!(response.header("set-cookie").is_none());

        StorageHandle::mark_changed(&handle);
        handle.commit(&mut response).await.unwrap();
        assert!(response.header("set-cookie").is_some());
    }

    #[tokio::test]
    async fn test_known_session_commit_is_noop() {
        let arena: SessionArena<Cart> = SessionArena::new();
        let handle = arena.session_for(&request_with_cookie(Some("__sessid=abc")));
        let mut response = Response::ok("x");
        handle.commit(&mut response).await.unwrap();
        assert!(response.header("set-cookie").is_none());
    }

    #[test]
    fn test_remove() {
        let arena: SessionArena<Cart> = SessionArena::new();
        let handle = arena.session_for(&request_with_cookie(Some("__sessid=gone")));
        assert!(arena.remove(handle.id()).is_some());
        assert!(arena.is_empty());
    }
}

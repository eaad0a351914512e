//! Shared fakes for the dispatch integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nav_core::{header_names, Request, Response, StatusCode, Url};
use nav_data::{Sleeper, Transport, TransportError};
use tokio::sync::Notify;

pub const ORIGIN: &str = "https://shop.example";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub struct Seen {
    pub url: String,
    pub retry: bool,
    pub accept: Option<String>,
    pub request: Request,
}

/// Plays back queued results, then answers `200 default`.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Response, TransportError>>>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(script: Vec<Result<Response, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, result: Result<Response, TransportError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
        self.seen.lock().unwrap().push(Seen {
            url: request.url.to_string(),
            retry: request.has_header(header_names::X_IS_RETRY),
            accept: request.header(header_names::ACCEPT).map(str::to_string),
            request: request.clone(),
        });
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Response::ok("default")))
    }
}

/// Answers `Retry-After` for paths starting with `/poll` and echoes the
/// path otherwise.
#[derive(Default)]
pub struct PollingTransport {
    seen: Mutex<Vec<String>>,
}

impl PollingTransport {
    pub fn calls_to(&self, path: &str) -> usize {
        self.seen.lock().unwrap().iter().filter(|p| p.as_str() == path).count()
    }
}

#[async_trait]
impl Transport for PollingTransport {
    async fn fetch(&self, request: Request) -> Result<Response, TransportError> {
        let path = request.url.path().to_string();
        self.seen.lock().unwrap().push(path.clone());
        if path.starts_with("/poll") {
            Ok(retry_after("1"))
        } else {
            Ok(Response::ok(path))
        }
    }
}

/// Signals when a wait starts and holds it until released.
#[derive(Default)]
pub struct GateSleeper {
    pub entered: Notify,
    pub release: Notify,
    waits: Mutex<Vec<Duration>>,
}

impl GateSleeper {
    pub fn wait_count(&self) -> usize {
        self.waits.lock().unwrap().len()
    }
}

#[async_trait]
impl Sleeper for GateSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
        self.entered.notify_one();
        self.release.notified().await;
    }
}

pub fn retry_after(secs: &str) -> Response {
    Response::new(StatusCode::ACCEPTED).with_header(header_names::RETRY_AFTER, secs)
}

pub fn connection_refused() -> Result<Response, TransportError> {
    Err(TransportError::Connection("connection refused".into()))
}

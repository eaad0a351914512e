//! The event that carries a request through the pipeline.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nav_core::{Request, RequestInit, Response, StorageSet};
use nav_relay::ClientPort;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;
use crate::responder::{Delivery, ImmediateResponse, Responder};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// How a navigation was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationType {
    /// The first navigation of a session.
    Startup,
    /// A new entry.
    #[default]
    Push,
    /// A redirect follow-up.
    Rdr,
    /// History traversal.
    Traverse,
    /// Programmatic initialization.
    Init,
}

/// Metadata about a navigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavigationDetail {
    pub navigation_type: NavigationType,
    pub navigation_origins: Vec<Value>,
    pub destination: Option<Value>,
    pub source: Option<Value>,
    pub user_initiated: bool,
}

impl NavigationDetail {
    pub fn new(navigation_type: NavigationType) -> Self {
        Self {
            navigation_type,
            ..Self::default()
        }
    }

    /// Detail for the first navigation of a session.
    pub fn startup() -> Self {
        Self::new(NavigationType::Startup)
    }

    pub fn with_user_initiated(mut self, user_initiated: bool) -> Self {
        self.user_initiated = user_initiated;
        self
    }

    pub fn with_origin(mut self, origin: Value) -> Self {
        self.navigation_origins.push(origin);
        self
    }

    pub fn is_startup(&self) -> bool {
        self.navigation_type == NavigationType::Startup
    }
}

/// A request travelling through the pipeline with its storages, client port
/// and response bookkeeping.
pub struct RequestEvent {
    id: u64,
    template: Arc<RequestInit>,
    request: Request,
    detail: Arc<NavigationDetail>,
    storages: StorageSet,
    client: Option<ClientPort>,
    resolved: AtomicBool,
    recorded: Mutex<Option<Response>>,
    responder: Arc<Responder>,
}

impl RequestEvent {
    /// Build an event from request input.
    ///
    /// Fails with [`DispatchError::InvalidArgument`] when the URL or method
    /// is missing or malformed.
    pub fn create(
        init: RequestInit,
        detail: NavigationDetail,
        storages: StorageSet,
        client: Option<ClientPort>,
    ) -> Result<Self, DispatchError> {
        let request = init.materialize()?;
        let responder = Arc::new(Responder::new(client.clone()));
        Ok(Self {
            id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            template: Arc::new(init),
            request,
            detail: Arc::new(detail),
            storages,
            client,
            resolved: AtomicBool::new(false),
            recorded: Mutex::new(None),
            responder,
        })
    }

    pub(crate) fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    /// Process-unique event identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn detail(&self) -> &NavigationDetail {
        &self.detail
    }

    pub fn storages(&self) -> &StorageSet {
        &self.storages
    }

    pub fn client(&self) -> Option<&ClientPort> {
        self.client.as_ref()
    }

    /// The input this event was built from.
    pub fn init(&self) -> &RequestInit {
        &self.template
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Whether a first response has already gone out for this navigation.
    pub fn initial_response_seen(&self) -> bool {
        self.responder.initial_seen()
    }

    pub fn final_response_seen(&self) -> bool {
        self.responder.final_seen()
    }

    /// A fresh event for a retry attempt.
    ///
    /// The request is rebuilt from the original input, so its body is
    /// unconsumed even if this event's body was read. Detail, storages,
    /// client and response delivery are shared.
    pub fn clone_for_retry(&self) -> Result<Self, DispatchError> {
        Ok(Self {
            id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            template: Arc::clone(&self.template),
            request: self.template.materialize()?,
            detail: Arc::clone(&self.detail),
            storages: self.storages.clone(),
            client: self.client.clone(),
            resolved: AtomicBool::new(false),
            recorded: Mutex::new(None),
            responder: Arc::clone(&self.responder),
        })
    }

    /// Resolve the event with its final response.
    ///
    /// Fails with [`DispatchError::AlreadyResolved`] on a second call, and
    /// with [`DispatchError::FinalResponseSent`] when another event of the
    /// same navigation already delivered the final response.
    pub fn resolve(&self, response: Response) -> Result<Delivery, DispatchError> {
        if self.resolved.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::AlreadyResolved);
        }
        *self.recorded.lock().unwrap_or_else(PoisonError::into_inner) = Some(response.clone());
        self.responder.deliver_final(response)
    }

    /// Send a response before the pipeline finishes.
    ///
    /// The first such response becomes the navigation's immediate response;
    /// later ones, and the eventual final response, go over the client port.
    pub fn respond_with(&self, response: Response) -> Result<Delivery, DispatchError> {
        self.responder.deliver_early(response)
    }

    /// The response recorded by [`RequestEvent::resolve`].
    pub fn resolved_response(&self) -> Option<Response> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Take the receiver for the navigation's first response. Only the
    /// first call gets it.
    pub fn immediate(&self) -> Option<ImmediateResponse> {
        self.responder.take_receiver()
    }

    pub(crate) fn fail(&self, error: DispatchError) -> Result<Delivery, DispatchError> {
        self.resolved.store(true, Ordering::SeqCst);
        self.responder.fail(error)
    }
}

impl fmt::Debug for RequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEvent")
            .field("id", &self.id)
            .field("method", &self.request.method)
            .field("url", &self.request.url.as_str())
            .field("navigation_type", &self.detail.navigation_type)
            .field("resolved", &self.is_resolved())
            .field("client", &self.client.as_ref().map(ClientPort::port_id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nav_core::{header_names, StatusCode};

    fn init() -> RequestInit {
        RequestInit::new("https://example.com/account")
    }

    // === Construction ===

    #[test]
    fn test_create_requires_url() {
        let mut input = init();
        input.url = None;
        let result = RequestEvent::create(input, NavigationDetail::default(), StorageSet::new(), None);
        assert!(matches!(result, Err(DispatchError::InvalidArgument(_))));
    }

    #[test]
    fn test_create_requires_method() {
        let mut input = init();
        input.method = None;
        let result = RequestEvent::create(input, NavigationDetail::default(), StorageSet::new(), None);
        assert!(matches!(result, Err(DispatchError::InvalidArgument(_))));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = RequestEvent::create(init(), NavigationDetail::default(), StorageSet::new(), None).unwrap();
        let b = RequestEvent::create(init(), NavigationDetail::default(), StorageSet::new(), None).unwrap();
        assert_ne!(a.id(), b.id());
    }

    // === Resolution ===

    #[tokio::test]
    async fn test_resolve_once() {
        let event = RequestEvent::create(init(), NavigationDetail::default(), StorageSet::new(), None).unwrap();
        let immediate = event.immediate().unwrap();

        assert_eq!(event.resolve(Response::ok("hello")).unwrap(), Delivery::Immediate);
        assert!(matches!(
            event.resolve(Response::ok("again")),
            Err(DispatchError::AlreadyResolved)
        ));
        assert_eq!(immediate.wait().await.unwrap().text().await.unwrap(), "hello");
        assert_eq!(event.resolved_response().unwrap().status, StatusCode::OK);
    }

    #[test]
    fn test_respond_with_after_final_fails() {
        let event = RequestEvent::create(init(), NavigationDetail::default(), StorageSet::new(), None).unwrap();
        event.resolve(Response::ok("done")).unwrap();
        assert!(matches!(
            event.respond_with(Response::ok("late")),
            Err(DispatchError::FinalResponseSent)
        ));
    }

    // === Cloning ===

    #[tokio::test]
    async fn test_clone_has_fresh_body() {
        let input = init().with_method("POST").with_body("payload");
        let event = RequestEvent::create(input, NavigationDetail::default(), StorageSet::new(), None).unwrap();
        assert_eq!(event.request().text().await.unwrap(), "payload");
        assert!(event.request().text().await.is_err());

        let clone = event.clone_for_retry().unwrap();
        assert_eq!(clone.request().text().await.unwrap(), "payload");
    }

    #[test]
    fn test_clone_rebuilds_from_input() {
        let mut event = RequestEvent::create(init(), NavigationDetail::default(), StorageSet::new(), None).unwrap();
        event.request_mut().set_header(header_names::X_IS_RETRY, "1").unwrap();
        event.resolve(Response::ok("first")).ok();

        let clone = event.clone_for_retry().unwrap();
        assert!(!clone.request().has_header(header_names::X_IS_RETRY));
        assert!(!clone.is_resolved());
        assert_ne!(clone.id(), event.id());
    }

    #[test]
    fn test_clone_shares_client() {
        let port = ClientPort::new();
        let event = RequestEvent::create(
            init(),
            NavigationDetail::startup(),
            StorageSet::new(),
            Some(port.clone()),
        )
        .unwrap();
        let clone = event.clone_for_retry().unwrap();
        assert_eq!(clone.client().unwrap().port_id(), port.port_id());
        assert!(clone.detail().is_startup());
    }

    #[test]
    fn test_detail_serde_names() {
        let detail = NavigationDetail::new(NavigationType::Traverse).with_user_initiated(true);
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["navigationType"], "traverse");
        assert_eq!(value["userInitiated"], true);
    }
}

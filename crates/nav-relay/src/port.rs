//! Client messaging port.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use futures::Stream;
use nav_core::Response;
use rand::Rng;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::RelayError;
use crate::message::{MessageData, PortMessage, ReplyKey, ReplyReceiver};

/// Default event type for posted messages.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// Event type of a late navigation response.
pub const RESPONSE_EVENT_TYPE: &str = "response";

/// Options for [`ClientPort::post_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOptions {
    pub event_type: String,
    /// Number of reply sub-ports to allocate.
    pub num_ports: usize,
}

impl PostOptions {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            num_ports: 0,
        }
    }

    pub fn with_ports(mut self, num_ports: usize) -> Self {
        self.num_ports = num_ports;
        self
    }
}

impl Default for PostOptions {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_TYPE)
    }
}

/// What the sender gets back from a post.
#[derive(Debug)]
pub struct PostReceipt {
    pub event_id: String,
    /// One receiver per allocated sub-port, in index order.
    pub replies: Vec<ReplyReceiver>,
}

pub(crate) struct PortInner {
    port_id: String,
    messaging: AtomicBool,
    closed: AtomicBool,
    next_event_id: AtomicU64,
    outbox: Mutex<Option<mpsc::UnboundedSender<PortMessage>>>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<PortMessage>>>,
    replies: Mutex<HashMap<ReplyKey, mpsc::UnboundedSender<MessageData>>>,
}

impl PortInner {
    pub(crate) fn deliver_reply(&self, key: &ReplyKey, data: MessageData) -> Result<(), RelayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::PortClosed(self.port_id.clone()));
        }
        let replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = replies
            .get(key)
            .ok_or_else(|| RelayError::NoReplyPort(key.to_string()))?;
        sender
            .send(data)
            .map_err(|_| RelayError::NoReplyPort(key.to_string()))
    }

    pub(crate) fn unregister_reply(&self, key: &ReplyKey) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.replies.lock().unwrap_or_else(PoisonError::into_inner).clear();
        debug!(port_id = %self.port_id, "port closed");
    }
}

fn generate_port_id() -> String {
    let bytes: [u8; 12] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// The messaging port attached to one navigation.
///
/// Messages are delivered in send order. Clones share the same port.
#[derive(Clone)]
pub struct ClientPort {
    inner: Arc<PortInner>,
}

impl ClientPort {
    /// Open a port with a fresh identifier.
    pub fn new() -> Self {
        Self::with_id(generate_port_id())
    }

    pub fn with_id(port_id: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(PortInner {
                port_id: port_id.into(),
                messaging: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                next_event_id: AtomicU64::new(1),
                outbox: Mutex::new(Some(tx)),
                inbox: Mutex::new(Some(rx)),
                replies: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn port_id(&self) -> &str {
        &self.inner.port_id
    }

    /// Whether anything has been, or will be, sent after the first response.
    pub fn is_messaging(&self) -> bool {
        self.inner.messaging.load(Ordering::SeqCst)
    }

    /// Declare that a message will follow the first response.
    pub fn mark_messaging(&self) {
        self.inner.messaging.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of open reply sub-ports.
    pub fn pending_replies(&self) -> usize {
        self.inner
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Post a message, allocating `options.num_ports` reply sub-ports.
    pub fn post_message(
        &self,
        data: impl Into<MessageData>,
        options: PostOptions,
    ) -> Result<PostReceipt, RelayError> {
        let outbox = self.inner.outbox.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = match outbox.as_ref() {
            Some(sender) if !self.is_closed() => sender,
            _ => return Err(RelayError::PortClosed(self.inner.port_id.clone())),
        };

        let event_id = format!("{:x}", self.inner.next_event_id.fetch_add(1, Ordering::SeqCst));
        let mut replies = Vec::with_capacity(options.num_ports);
        {
            let mut registry = self.inner.replies.lock().unwrap_or_else(PoisonError::into_inner);
            for index in 0..options.num_ports {
                let key = ReplyKey::new(options.event_type.clone(), event_id.clone(), index);
                let (tx, rx) = mpsc::unbounded_channel();
                registry.insert(key.clone(), tx);
                replies.push(ReplyReceiver::new(key, rx, Arc::downgrade(&self.inner)));
            }
        }

        let message = PortMessage {
            event_id: event_id.clone(),
            event_type: options.event_type.clone(),
            data: Some(data.into()),
            num_ports: options.num_ports,
            port: Arc::downgrade(&self.inner),
        };
        if sender.send(message).is_err() {
            return Err(RelayError::PortClosed(self.inner.port_id.clone()));
        }
        self.mark_messaging();
        debug!(
            port_id = %self.inner.port_id,
            event_type = %options.event_type,
            event_id = %event_id,
            num_ports = options.num_ports,
            "message posted"
        );

        Ok(PostReceipt { event_id, replies })
    }

    /// Push a late response (event type `response`).
    pub fn push_response(&self, response: Response) -> Result<String, RelayError> {
        self.post_message(response, PostOptions::new(RESPONSE_EVENT_TYPE))
            .map(|receipt| receipt.event_id)
    }

    /// Post a message that expects exactly one reply (e.g. `confirm`, `prompt`).
    pub fn post_request(
        &self,
        event_type: impl Into<String>,
        data: Value,
    ) -> Result<ReplyReceiver, RelayError> {
        let mut receipt = self.post_message(data, PostOptions::new(event_type).with_ports(1))?;
        receipt
            .replies
            .pop()
            .ok_or_else(|| RelayError::NoReplyPort(receipt.event_id.clone()))
    }

    /// Take the receiving side. Only the first call gets it.
    pub fn messages(&self) -> Option<LateMessages> {
        let rx = self.inner.inbox.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        Some(LateMessages {
            rx,
            port: Arc::downgrade(&self.inner),
        })
    }

    /// Close the port. Registered reply sub-ports are removed and messages
    /// not yet received are dropped.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Default for ClientPort {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientPort")
            .field("port_id", &self.inner.port_id)
            .field("messaging", &self.is_messaging())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Lazy, cancelable sequence of messages sent after the first response.
///
/// Ends when the port is closed or every sending handle is gone.
pub struct LateMessages {
    rx: mpsc::UnboundedReceiver<PortMessage>,
    port: Weak<PortInner>,
}

impl LateMessages {
    /// Close the port; the stream ends.
    pub fn cancel(&self) {
        if let Some(port) = self.port.upgrade() {
            port.close();
        }
    }

    /// Wait for the next message.
    pub async fn next_message(&mut self) -> Option<PortMessage> {
        futures::StreamExt::next(self).await
    }
}

impl Stream for LateMessages {
    type Item = PortMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(port) = self.port.upgrade() {
            if port.closed.load(Ordering::SeqCst) {
                return Poll::Ready(None);
            }
        }
        self.rx.poll_recv(cx)
    }
}

impl fmt::Debug for LateMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LateMessages").finish_non_exhaustive()
    }
}

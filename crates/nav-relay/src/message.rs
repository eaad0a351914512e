//! Messages pushed over a client port and their reply channels.

use std::fmt;
use std::str::FromStr;
use std::sync::Weak;

use nav_core::Response;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::port::PortInner;

/// Payload of a background message.
#[derive(Debug)]
pub enum MessageData {
    /// A late response for the navigation.
    Response(Response),
    /// Structured data.
    Json(Value),
}

impl MessageData {
    /// The response payload, if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Response(response) => Some(response),
            Self::Json(_) => None,
        }
    }

    /// The JSON payload, if any.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Response(_) => None,
        }
    }

    /// Render the payload as JSON for socket framing.
    ///
    /// Responses become `{status, headers, body}`; their body is consumed.
    pub async fn to_wire(&self) -> Result<Value, RelayError> {
        match self {
            Self::Json(value) => Ok(value.clone()),
            Self::Response(response) => {
                let headers: Map<String, Value> = response
                    .headers
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|v| (name.to_string(), Value::String(v.to_string())))
                    })
                    .collect();
                let body = response
                    .text()
                    .await
                    .map_err(|e| RelayError::MalformedEnvelope(e.to_string()))?;
                Ok(json!({
                    "status": response.status.as_u16(),
                    "headers": headers,
                    "body": body,
                }))
            }
        }
    }
}

impl From<Response> for MessageData {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

impl From<Value> for MessageData {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Address of one reply sub-port: `{eventType}:{eventID}:{index}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyKey {
    pub event_type: String,
    pub event_id: String,
    pub index: usize,
}

impl ReplyKey {
    pub fn new(event_type: impl Into<String>, event_id: impl Into<String>, index: usize) -> Self {
        Self {
            event_type: event_type.into(),
            event_id: event_id.into(),
            index,
        }
    }
}

impl fmt::Display for ReplyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.event_type, self.event_id, self.index)
    }
}

impl FromStr for ReplyKey {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RelayError::MalformedEnvelope(format!("invalid reply channel {s:?}"));
        let mut parts = s.rsplitn(3, ':');
        let index = parts
            .next()
            .and_then(|i| i.parse::<usize>().ok())
            .ok_or_else(malformed)?;
        let event_id = parts.next().filter(|p| !p.is_empty()).ok_or_else(malformed)?;
        let event_type = parts.next().filter(|p| !p.is_empty()).ok_or_else(malformed)?;
        Ok(Self::new(event_type, event_id, index))
    }
}

/// A message as seen by the receiving side of a port.
pub struct PortMessage {
    pub(crate) event_id: String,
    pub(crate) event_type: String,
    pub(crate) data: Option<MessageData>,
    pub(crate) num_ports: usize,
    pub(crate) port: Weak<PortInner>,
}

impl PortMessage {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Number of reply sub-ports the sender allocated.
    pub fn num_ports(&self) -> usize {
        self.num_ports
    }

    pub fn data(&self) -> Option<&MessageData> {
        self.data.as_ref()
    }

    /// Take the payload out of the message.
    pub fn take_data(&mut self) -> Option<MessageData> {
        self.data.take()
    }

    /// Reply on the message's only sub-port.
    ///
    /// Returns `Ok(false)` when the sender expects no reply and fails with
    /// [`RelayError::AmbiguousReplyTarget`] when it allocated several.
    pub fn respond_with(&self, data: impl Into<MessageData>) -> Result<bool, RelayError> {
        match self.num_ports {
            0 => Ok(false),
            1 => self.reply_on(0, data).map(|_| true),
            n => Err(RelayError::AmbiguousReplyTarget {
                event_id: self.event_id.clone(),
                num_ports: n,
            }),
        }
    }

    /// Reply on a specific sub-port.
    pub fn reply_on(&self, index: usize, data: impl Into<MessageData>) -> Result<(), RelayError> {
        let key = ReplyKey::new(self.event_type.clone(), self.event_id.clone(), index);
        if index >= self.num_ports {
            return Err(RelayError::NoReplyPort(key.to_string()));
        }
        let port = self
            .port
            .upgrade()
            .ok_or_else(|| RelayError::PortClosed(key.to_string()))?;
        port.deliver_reply(&key, data.into())
    }
}

impl fmt::Debug for PortMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortMessage")
            .field("event_id", &self.event_id)
            .field("event_type", &self.event_type)
            .field("num_ports", &self.num_ports)
            .field("data", &self.data)
            .finish()
    }
}

/// The sender's end of one reply sub-port.
///
/// Dropping or closing it removes the sub-port from the port's registry.
pub struct ReplyReceiver {
    key: ReplyKey,
    rx: mpsc::UnboundedReceiver<MessageData>,
    port: Weak<PortInner>,
}

impl ReplyReceiver {
    pub(crate) fn new(
        key: ReplyKey,
        rx: mpsc::UnboundedReceiver<MessageData>,
        port: Weak<PortInner>,
    ) -> Self {
        Self { key, rx, port }
    }

    pub fn key(&self) -> &ReplyKey {
        &self.key
    }

    /// Wait for the next reply. `None` once the port is closed.
    pub async fn recv(&mut self) -> Option<MessageData> {
        self.rx.recv().await
    }

    /// Close the sub-port.
    pub fn close(self) {}
}

impl Drop for ReplyReceiver {
    fn drop(&mut self) {
        if let Some(port) = self.port.upgrade() {
            port.unregister_reply(&self.key);
        }
    }
}

impl fmt::Debug for ReplyReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyReceiver").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_key_display() {
        let key = ReplyKey::new("confirm", "a1", 0);
        assert_eq!(key.to_string(), "confirm:a1:0");
    }

    #[test]
    fn test_reply_key_parse() {
        let key: ReplyKey = "prompt:zz9:2".parse().unwrap();
        assert_eq!(key, ReplyKey::new("prompt", "zz9", 2));
    }

    #[test]
    fn test_reply_key_parse_type_with_colon() {
        let key: ReplyKey = "ns:confirm:a1:0".parse().unwrap();
        assert_eq!(key.event_type, "ns:confirm");
        assert_eq!(key.event_id, "a1");
    }

    #[test]
    fn test_reply_key_parse_rejects_garbage() {
        assert!("confirm".parse::<ReplyKey>().is_err());
        assert!("confirm:a1:x".parse::<ReplyKey>().is_err());
        assert!(":a1:0".parse::<ReplyKey>().is_err());
    }

    #[tokio::test]
    async fn test_response_to_wire() {
        let data = MessageData::from(Response::ok("late").with_header("x-a", "1"));
        let wire = data.to_wire().await.unwrap();
        assert_eq!(wire["status"], 200);
        assert_eq!(wire["headers"]["x-a"], "1");
        assert_eq!(wire["body"], "late");
    }

    #[tokio::test]
    async fn test_json_to_wire() {
        let data = MessageData::from(json!({"ok": true}));
        assert_eq!(data.to_wire().await.unwrap(), json!({"ok": true}));
        assert!(data.as_json().is_some());
    }
}

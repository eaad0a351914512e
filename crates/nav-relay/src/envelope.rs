//! JSON framing for socket-based ports.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;
use crate::message::{PortMessage, ReplyKey};

/// One message frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    #[serde(rename = "eventID")]
    pub event_id: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: Value,
    #[serde(rename = "numPorts", default)]
    pub num_ports: usize,
}

impl MessageEnvelope {
    pub fn new(event_id: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            data,
            num_ports: 0,
        }
    }

    pub fn with_ports(mut self, num_ports: usize) -> Self {
        self.num_ports = num_ports;
        self
    }

    /// Frame a port message. Response payloads are consumed.
    pub async fn from_message(message: &PortMessage) -> Result<Self, RelayError> {
        let data = match message.data() {
            Some(data) => data.to_wire().await?,
            None => Value::Null,
        };
        Ok(Self::new(message.event_id(), message.event_type(), data).with_ports(message.num_ports()))
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::MalformedEnvelope(e.to_string()))
    }

    /// Decode a JSON text frame. `eventID`, `eventType` and `data` are required.
    pub fn decode(frame: &str) -> Result<Self, RelayError> {
        serde_json::from_str(frame).map_err(|e| RelayError::MalformedEnvelope(e.to_string()))
    }

    /// Reply channel names for every sub-port of this frame.
    pub fn reply_keys(&self) -> Vec<ReplyKey> {
        (0..self.num_ports)
            .map(|i| ReplyKey::new(self.event_type.clone(), self.event_id.clone(), i))
            .collect()
    }

    /// The frame that carries a reply on sub-port `index`.
    pub fn reply(&self, index: usize, data: Value) -> Result<Self, RelayError> {
        if index >= self.num_ports {
            return Err(RelayError::NoReplyPort(
                ReplyKey::new(self.event_type.clone(), self.event_id.clone(), index).to_string(),
            ));
        }
        let key = ReplyKey::new(self.event_type.clone(), self.event_id.clone(), index);
        Ok(Self::new(self.event_id.clone(), key.to_string(), data))
    }
}

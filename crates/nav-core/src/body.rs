//! Single-consumption message bodies.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::error::CoreError;

type ByteStream = BoxStream<'static, Result<Bytes, CoreError>>;

enum BodyState {
    Empty,
    Ready(Bytes),
    Streaming(ByteStream),
    Consumed,
}

/// A request or response body that can be read at most once.
///
/// Cloning a `Body` is shallow: both handles observe the same consumption
/// state. Use [`Body::from_bytes`] on buffered content to get an
/// independent body.
#[derive(Clone)]
pub struct Body {
    state: Arc<Mutex<BodyState>>,
}

impl Body {
    /// A body with no content.
    pub fn empty() -> Self {
        Self::with_state(BodyState::Empty)
    }

    /// A buffered body.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::with_state(BodyState::Ready(bytes.into()))
    }

    /// A streaming body.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, CoreError>> + Send + 'static,
    {
        Self::with_state(BodyState::Streaming(stream.boxed()))
    }

    fn with_state(state: BodyState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Read the whole body, consuming it.
    ///
    /// An empty body reads as empty bytes and stays readable. Any other body
    /// fails with [`CoreError::BodyConsumed`] on the second read.
    pub async fn bytes(&self) -> Result<Bytes, CoreError> {
        let taken = {
            let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *guard {
                BodyState::Empty => return Ok(Bytes::new()),
                BodyState::Consumed => return Err(CoreError::BodyConsumed),
                _ => {}
            }
            std::mem::replace(&mut *guard, BodyState::Consumed)
        };

        match taken {
            BodyState::Ready(bytes) => Ok(bytes),
            BodyState::Streaming(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
            BodyState::Empty | BodyState::Consumed => Ok(Bytes::new()),
        }
    }

    /// Whether the body has already been read.
    pub fn is_consumed(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            BodyState::Consumed
        )
    }

    /// Whether the body was created without content.
    pub fn is_empty(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            BodyState::Empty
        )
    }

    /// Whether two handles share the same underlying body.
    pub fn shares_with(&self, other: &Body) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            BodyState::Empty => "empty",
            BodyState::Ready(_) => "ready",
            BodyState::Streaming(_) => "streaming",
            BodyState::Consumed => "consumed",
        };
        f.debug_struct("Body").field("state", &state).finish()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::from_bytes(Bytes::from(text))
    }
}

impl From<Vec<u8>> for Body {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(Bytes::from(data))
    }
}

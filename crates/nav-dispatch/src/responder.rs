//! Delivery of a navigation's responses.
//!
//! The first response goes back through the immediate return path. Anything
//! after that travels over the navigation's client port.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nav_core::Response;
use nav_observability::DispatchMetrics;
use nav_relay::ClientPort;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::DispatchError;

type ImmediateSender = oneshot::Sender<Result<Response, DispatchError>>;

/// Where a delivered response went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Sent through the immediate return path.
    Immediate,
    /// Pushed over the client port as a background message.
    Pushed { event_id: String },
    /// No receiver remained; the response was dropped.
    Dropped,
}

/// Receives the first response of a navigation.
#[derive(Debug)]
pub struct ImmediateResponse {
    rx: oneshot::Receiver<Result<Response, DispatchError>>,
}

impl ImmediateResponse {
    /// Wait for the first response or the failure that replaced it.
    pub async fn wait(self) -> Result<Response, DispatchError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::DispatchFailed(anyhow::anyhow!(
                "navigation ended without a response"
            ))),
        }
    }
}

/// Shared by an event and all of its retry clones.
pub(crate) struct Responder {
    immediate: Mutex<Option<ImmediateSender>>,
    receiver: Mutex<Option<ImmediateResponse>>,
    initial_seen: AtomicBool,
    final_seen: AtomicBool,
    client: Option<ClientPort>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl Responder {
    pub(crate) fn new(client: Option<ClientPort>) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            immediate: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(ImmediateResponse { rx })),
            initial_seen: AtomicBool::new(false),
            final_seen: AtomicBool::new(false),
            client,
            metrics: None,
        }
    }

    pub(crate) fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub(crate) fn take_receiver(&self) -> Option<ImmediateResponse> {
        self.receiver.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    pub(crate) fn initial_seen(&self) -> bool {
        self.initial_seen.load(Ordering::SeqCst)
    }

    pub(crate) fn final_seen(&self) -> bool {
        self.final_seen.load(Ordering::SeqCst)
    }

    /// Deliver an early response, before the pipeline has finished.
    pub(crate) fn deliver_early(&self, response: Response) -> Result<Delivery, DispatchError> {
        if self.final_seen() {
            return Err(DispatchError::FinalResponseSent);
        }
        self.deliver(Ok(response), false)
    }

    /// Deliver the pipeline's final response. Only the first call succeeds.
    pub(crate) fn deliver_final(&self, response: Response) -> Result<Delivery, DispatchError> {
        if self.final_seen.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::FinalResponseSent);
        }
        self.deliver(Ok(response), true)
    }

    /// Replace the final response with a failure.
    ///
    /// After an early response the failure is pushed as a `500` message.
    pub(crate) fn fail(&self, error: DispatchError) -> Result<Delivery, DispatchError> {
        if self.final_seen.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::FinalResponseSent);
        }
        self.deliver(Err(error), true)
    }

    fn deliver(
        &self,
        result: Result<Response, DispatchError>,
        is_final: bool,
    ) -> Result<Delivery, DispatchError> {
        let pending = self.immediate.lock().unwrap_or_else(PoisonError::into_inner).take();
        match pending {
            Some(tx) => {
                self.initial_seen.store(true, Ordering::SeqCst);
                if !is_final {
                    if let Some(client) = &self.client {
                        client.mark_messaging();
                    }
                }
                if tx.send(result).is_err() {
                    debug!("immediate receiver gone, response dropped");
                    return Ok(Delivery::Dropped);
                }
                Ok(Delivery::Immediate)
            }
            None => {
                let response = match result {
                    Ok(response) => response,
                    Err(error) => Response::internal_error(error.to_string()),
                };
                self.push(response)
            }
        }
    }

    fn push(&self, response: Response) -> Result<Delivery, DispatchError> {
        let Some(client) = &self.client else {
            debug!(status = %response.status, "no client port, late response dropped");
            return Ok(Delivery::Dropped);
        };
        match client.push_response(response) {
            Ok(event_id) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_background_message();
                }
                Ok(Delivery::Pushed { event_id })
            }
            Err(error) => {
                debug!(port_id = %client.port_id(), error = %error, "late response dropped");
                Ok(Delivery::Dropped)
            }
        }
    }
}

//! Redirect normalization and the Retry-After polling loop.

use std::fmt;
use std::sync::Arc;

use nav_core::{
    header_names, header_values, is_followable_redirect, redirect_code, retry_after_secs, Response,
    SENTINEL_REDIRECT_CODE,
};
use nav_data::{RetryPolicy, RetryState, RetryToken, Sleeper, TokioSleeper};
use nav_observability::DispatchMetrics;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::DispatchContext;
use crate::error::DispatchError;
use crate::event::RequestEvent;
use crate::pipeline::{Pipeline, Terminal};

/// Polling phase of one dispatch chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPhase {
    /// No retry directive pending.
    #[default]
    Idle,
    /// Waiting to re-dispatch.
    Polling,
    /// Polling stopped by a cancellation.
    Cancelled,
}

/// State carried across the attempts of one dispatch chain.
#[derive(Debug, Clone, Default)]
pub struct ProcessState {
    retry: Option<RetryState>,
    signal: Option<RetryToken>,
    exited: bool,
    phase: RetryPhase,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch an external abort signal, e.g. a newer navigation superseding
    /// this one.
    pub fn with_signal(mut self, signal: RetryToken) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Mark the chain as exited; redirects are then no longer triggered.
    pub fn with_exited(mut self, exited: bool) -> Self {
        self.exited = exited;
        self
    }

    pub fn mark_exited(&mut self) {
        self.exited = true;
    }

    pub fn is_exited(&self) -> bool {
        self.exited
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    /// The live retry state, once a directive was seen.
    pub fn retry(&self) -> Option<&RetryState> {
        self.retry.as_ref()
    }

    /// Completed retry waits.
    pub fn attempts(&self) -> u32 {
        self.retry.as_ref().map_or(0, RetryState::attempts)
    }

    /// Whether polling was aborted, by the chain itself or by the external
    /// signal.
    pub fn is_cancelled(&self) -> bool {
        self.retry.as_ref().is_some_and(RetryState::is_aborted)
            || self.signal.as_ref().is_some_and(RetryToken::is_aborted)
    }

    fn observe_directive(&mut self) {
        if self.retry.is_none() {
            self.retry = Some(RetryState::new());
        }
        self.phase = RetryPhase::Polling;
    }

    fn observe_plain_response(&mut self) {
        if let Some(retry) = &self.retry {
            retry.cancel();
            self.phase = RetryPhase::Idle;
        }
    }

    fn stop(&mut self) {
        if let Some(retry) = &self.retry {
            retry.cancel();
        }
        self.phase = RetryPhase::Cancelled;
    }
}

/// Follow-up for redirects discovered by the dispatcher. Not awaited.
pub trait Redirector: Send + Sync {
    fn redirect(&self, location: &str, state: &ProcessState);
}

impl<F> Redirector for F
where
    F: Fn(&str, &ProcessState) + Send + Sync,
{
    fn redirect(&self, location: &str, state: &ProcessState) {
        self(location, state)
    }
}

/// A redirect discovered during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRequest {
    pub location: String,
    pub attempts: u32,
}

/// Forwards redirect locations into a channel for the navigation layer.
#[derive(Debug, Clone)]
pub struct ChannelRedirector {
    tx: mpsc::UnboundedSender<RedirectRequest>,
}

impl ChannelRedirector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RedirectRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Redirector for ChannelRedirector {
    fn redirect(&self, location: &str, state: &ProcessState) {
        let request = RedirectRequest {
            location: location.to_string(),
            attempts: state.attempts(),
        };
        if self.tx.send(request).is_err() {
            debug!(location, "redirect receiver gone");
        }
    }
}

/// Runs the pipeline and drives the redirect and Retry-After state machine
/// over its responses.
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Pipeline,
    sleeper: Arc<dyn Sleeper>,
    redirector: Option<Arc<dyn Redirector>>,
    policy: RetryPolicy,
    metrics: Arc<DispatchMetrics>,
}

impl Dispatcher {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            sleeper: Arc::new(TokioSleeper),
            redirector: None,
            policy: RetryPolicy::unbounded(),
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_redirector(mut self, redirector: Arc<dyn Redirector>) -> Self {
        self.redirector = Some(redirector);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Dispatch `event`, then keep re-dispatching fresh clones of it for as
    /// long as responses carry `Retry-After` and polling is not cancelled.
    ///
    /// Each retry waits through the sleeper first. Cancellation is checked
    /// again after the wait, so an aborted chain never dispatches once more.
    pub async fn dispatch(
        &self,
        event: &mut RequestEvent,
        ctx: &DispatchContext,
        terminal: &dyn Terminal,
        state: &mut ProcessState,
    ) -> Result<Response, DispatchError> {
        let mut response = self.pipeline.dispatch(event, ctx, terminal).await?;

        loop {
            let Some(secs) = self.normalize(&mut response, state) else {
                return Ok(response);
            };

            if state.is_cancelled() {
                self.cancelled(state, "retry token aborted before wait");
                return Ok(response);
            }
            if !self.policy.allows(state.attempts()) {
                warn!(attempts = state.attempts(), "retry ceiling reached");
                state.stop();
                return Ok(response);
            }

            let delay = self.policy.delay_for(secs);
            self.metrics.record_retry_wait();
            debug!(
                attempt = state.attempts() + 1,
                delay_secs = delay.as_secs(),
                "waiting before retry"
            );
            self.sleeper.sleep(delay).await;

            if state.is_cancelled() {
                self.cancelled(state, "retry token aborted during wait");
                return Ok(response);
            }
            if let Some(retry) = state.retry.as_mut() {
                retry.record_attempt();
            }

            let mut retry = event.clone_for_retry()?;
            retry
                .request_mut()
                .set_header(header_names::X_IS_RETRY, header_values::FLAG_ON)?;
            response = self.pipeline.dispatch(&mut retry, ctx, terminal).await?;
        }
    }

    /// Apply the retry and redirect rules to one response. Returns the
    /// `Retry-After` seconds when a retry is requested.
    fn normalize(&self, response: &mut Response, state: &mut ProcessState) -> Option<u64> {
        let retry_after = retry_after_secs(&response.headers);
        match retry_after {
            Some(_) => state.observe_directive(),
            None => state.observe_plain_response(),
        }

        if response.status == SENTINEL_REDIRECT_CODE {
            if let Some(code) = redirect_code(&response.headers) {
                response.status = code;
            }
        }

        if is_followable_redirect(response.status) && !state.is_exited() {
            if let Some(location) = response.location().map(str::to_owned) {
                self.metrics.record_redirect();
                info!(status = %response.status, location = %location, "redirect");
                match &self.redirector {
                    Some(redirector) => redirector.redirect(&location, state),
                    None => debug!(location = %location, "no redirector installed"),
                }
            }
        }

        retry_after
    }

    fn cancelled(&self, state: &mut ProcessState, reason: &str) {
        self.metrics.record_retry_cancellation();
        debug!(attempts = state.attempts(), reason, "retry loop cancelled");
        state.stop();
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("middlewares", &self.pipeline.len())
            .field("policy", &self.policy)
            .field("redirector", &self.redirector.is_some())
            .finish()
    }
}

//! Middleware composition.

use std::sync::Arc;

use async_trait::async_trait;
use nav_cache::{CacheError, StrategyExecutor};
use nav_core::{header_names, header_values, Response};
use tracing::debug;

use crate::context::DispatchContext;
use crate::error::DispatchError;
use crate::event::RequestEvent;

/// One step of the pipeline.
///
/// A middleware either answers the event itself or hands it on through
/// `next`, optionally substituting a different event.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        event: &mut RequestEvent,
        ctx: &DispatchContext,
        next: Next<'_>,
    ) -> anyhow::Result<Response>;
}

/// The handler at the end of the chain.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// `nexted` is true when `event` is not the event the dispatch started
    /// with.
    async fn deliver(&self, event: &mut RequestEvent, nexted: bool) -> anyhow::Result<Response>;
}

/// The remainder of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Terminal,
    ctx: &'a DispatchContext,
    root_id: u64,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain against `event`.
    pub async fn run(self, event: &mut RequestEvent) -> anyhow::Result<Response> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    ..self
                };
                head.handle(event, self.ctx, next).await
            }
            None => {
                let nexted = event.id() != self.root_id;
                self.terminal.deliver(event, nexted).await
            }
        }
    }

    /// Number of middlewares left before the terminal.
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }
}

/// An ordered list of middlewares.
///
/// Each dispatch runs against a snapshot, so registering a middleware never
/// affects a dispatch already in flight.
#[derive(Clone, Default)]
pub struct Pipeline {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.push(Arc::new(middleware));
        self
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        Arc::make_mut(&mut self.middlewares).push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the chain once against `event`.
    ///
    /// Cache and transport failures surface as [`DispatchError::Cache`];
    /// any other handler failure becomes [`DispatchError::DispatchFailed`].
    pub async fn dispatch(
        &self,
        event: &mut RequestEvent,
        ctx: &DispatchContext,
        terminal: &dyn Terminal,
    ) -> Result<Response, DispatchError> {
        let chain = Arc::clone(&self.middlewares);
        let next = Next {
            chain: &chain,
            terminal,
            ctx,
            root_id: event.id(),
        };
        next.run(event)
            .await
            .map_err(|error| match error.downcast::<CacheError>() {
                Ok(cache) => DispatchError::Cache(cache),
                Err(error) => DispatchError::DispatchFailed(error),
            })
    }
}

/// Terminal that delegates to the strategy executors.
///
/// Nexted sub-requests get `Accept: application/json` unless they already
/// carry an `Accept` header. An empty result (cache-only miss) is answered
/// with `404`.
#[derive(Clone)]
pub struct CrossLayerFetch {
    executor: Option<StrategyExecutor>,
}

impl CrossLayerFetch {
    pub fn new(executor: StrategyExecutor) -> Self {
        Self {
            executor: Some(executor),
        }
    }

    /// A terminal with no remote layer; every request is answered with `404`.
    pub fn local() -> Self {
        Self { executor: None }
    }

    pub fn executor(&self) -> Option<&StrategyExecutor> {
        self.executor.as_ref()
    }
}

#[async_trait]
impl Terminal for CrossLayerFetch {
    async fn deliver(&self, event: &mut RequestEvent, nexted: bool) -> anyhow::Result<Response> {
        if nexted && !event.request().has_header(header_names::ACCEPT) {
            event
                .request_mut()
                .set_header(header_names::ACCEPT, header_values::APPLICATION_JSON)?;
        }
        let Some(executor) = &self.executor else {
            debug!(url = %event.request().url, "no remote layer, answering 404");
            return Ok(Response::not_found());
        };

        let outcome = executor.fetch(event.request().clone()).await?;
        debug!(
            url = %event.request().url,
            strategy = %outcome.strategy,
            source = ?outcome.source,
            "cross-layer fetch complete"
        );
        Ok(outcome.response.unwrap_or_else(Response::not_found))
    }
}

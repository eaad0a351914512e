//! Navigations with a two-phase outcome: an immediate response plus a
//! stream of late messages.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use nav_cache::{CacheStore, InMemoryCacheStore, PathTemplateMatcher, StrategyExecutor, UrlMatcher};
use nav_core::{
    background_channel, header_names, header_values, CacheMode, Request, RequestInit, RequestMode,
    Response, SessionArena, StatusCode, StorageSet, SENTINEL_REDIRECT_CODE,
};
use nav_data::{RetryToken, Sleeper, TimeoutTransport, Transport};
use nav_observability::DispatchMetrics;
use nav_relay::{ClientPort, LateMessages};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::NavigatorConfig;
use crate::context::DispatchContext;
use crate::dispatcher::{Dispatcher, ProcessState, Redirector};
use crate::error::DispatchError;
use crate::event::{NavigationDetail, RequestEvent};
use crate::pipeline::{CrossLayerFetch, Middleware, Pipeline};
use crate::responder::Responder;

/// Supplies the storage handles for a new event.
pub trait StorageProvider: Send + Sync {
    fn storages_for(&self, request: &Request) -> StorageSet;
}

impl<S: Default + Send + Sync + 'static> StorageProvider for SessionArena<S> {
    fn storages_for(&self, request: &Request) -> StorageSet {
        StorageSet::new().with_session(Arc::new(self.session_for(request)))
    }
}

/// Result of a navigation.
pub struct DispatchOutcome {
    /// The first response.
    pub immediate: Response,
    /// Messages pushed after the first response, when the navigation has
    /// background activity.
    pub late: Option<LateMessages>,
    /// Re-issues the navigation; set for `404` and `500` outcomes.
    pub retry: Option<RetryNavigation>,
    /// The failure behind a `500` outcome.
    pub error: Option<Arc<DispatchError>>,
}

impl DispatchOutcome {
    fn immediate(response: Response) -> Self {
        Self {
            immediate: response,
            late: None,
            retry: None,
            error: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// The `X-Background-Activity` channel of the immediate response.
    pub fn background_channel(&self) -> Option<&str> {
        self.immediate.header(header_names::X_BACKGROUND_ACTIVITY)
    }
}

impl fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOutcome")
            .field("status", &self.immediate.status)
            .field("late", &self.late.is_some())
            .field("retry", &self.retry.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// Re-issues a navigation with its original input and detail.
#[derive(Clone)]
pub struct RetryNavigation {
    navigator: Navigator,
    init: RequestInit,
    detail: NavigationDetail,
    launch: Launch,
}

impl RetryNavigation {
    pub fn init(&self) -> &RequestInit {
        &self.init
    }

    pub fn detail(&self) -> &NavigationDetail {
        &self.detail
    }

    pub async fn run(&self) -> Result<DispatchOutcome, DispatchError> {
        self.navigator
            .start(self.init.clone(), self.detail.clone(), self.launch)
            .await
    }
}

impl fmt::Debug for RetryNavigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryNavigation")
            .field("url", &self.init.url)
            .field("navigation_type", &self.detail.navigation_type)
            .finish()
    }
}

/// How a dispatch is started.
#[derive(Debug, Clone, Copy)]
struct Launch {
    /// Apply the configured request defaults.
    with_defaults: bool,
    /// Replace the navigation in flight, cancelling its Retry-After polling.
    supersede: bool,
}

impl Launch {
    const NAVIGATION: Launch = Launch {
        with_defaults: true,
        supersede: true,
    };

    fn intercepted(mode: RequestMode) -> Self {
        Self {
            with_defaults: false,
            supersede: mode == RequestMode::Navigate,
        }
    }
}

struct NavigatorInner {
    config: NavigatorConfig,
    executor: StrategyExecutor,
    dispatcher: Dispatcher,
    terminal: CrossLayerFetch,
    storage: Option<Arc<dyn StorageProvider>>,
    metrics: Arc<DispatchMetrics>,
    current: Mutex<Option<RetryToken>>,
}

/// Entry point for navigations and intercepted fetches.
///
/// Clones share the same pipeline, cache and metrics.
#[derive(Clone)]
pub struct Navigator {
    inner: Arc<NavigatorInner>,
}

impl Navigator {
    pub fn builder(config: NavigatorConfig) -> NavigatorBuilder {
        NavigatorBuilder::new(config)
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.inner.metrics
    }

    pub fn executor(&self) -> &StrategyExecutor {
        &self.inner.executor
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Start a navigation and wait for its first response.
    ///
    /// The pipeline keeps running in the background when a handler answered
    /// early; its final response then arrives on `late`. Starting a
    /// navigation aborts the Retry-After polling of the previous one.
    pub async fn navigate(
        &self,
        init: RequestInit,
        detail: NavigationDetail,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.start(init, detail, Launch::NAVIGATION).await
    }

    /// Handle an intercepted fetch.
    ///
    /// Non-http(s) requests are ignored. Cross-origin requests skip the
    /// pipeline and go straight through the strategy executors. Navigation
    /// and `force-cache` requests are dispatched with the default cache
    /// mode. Only navigation-mode requests supersede the navigation in
    /// flight; sub-resource fetches leave its polling alone.
    pub async fn intercept(
        &self,
        mut init: RequestInit,
    ) -> Result<Option<DispatchOutcome>, DispatchError> {
        if init.mode == RequestMode::Navigate || init.cache == CacheMode::ForceCache {
            init.cache = CacheMode::Default;
        }
        let request = init.materialize()?;
        if !request.is_http() {
            debug!(url = %request.url, "ignoring non-http request");
            return Ok(None);
        }

        if !request.is_same_origin(&self.inner.config.origin) {
            debug!(url = %request.url, "cross-origin request, bypassing pipeline");
            let outcome = self.inner.executor.fetch(request).await?;
            let response = outcome.response.unwrap_or_else(Response::not_found);
            return Ok(Some(DispatchOutcome::immediate(response)));
        }

        let launch = Launch::intercepted(init.mode);
        self.start(init, NavigationDetail::default(), launch)
            .await
            .map(Some)
    }

    /// Precache the configured resources. Returns the number written.
    pub async fn install(&self) -> Result<usize, DispatchError> {
        let count = self.inner.executor.precache(&self.inner.config.origin).await?;
        info!(count, "install complete");
        Ok(count)
    }

    /// Delete stale cache partitions. Returns their names.
    pub async fn activate(&self) -> Result<Vec<String>, DispatchError> {
        Ok(self.inner.executor.purge_stale_partitions().await?)
    }

    /// Abort Retry-After polling of the navigation in flight.
    pub fn abort(&self) {
        if let Some(token) = self.current().take() {
            token.cancel();
        }
    }

    fn current(&self) -> std::sync::MutexGuard<'_, Option<RetryToken>> {
        self.inner.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prepare(
        &self,
        mut init: RequestInit,
        detail: &NavigationDetail,
        with_defaults: bool,
    ) -> RequestInit {
        if with_defaults && self.inner.config.request_defaults {
            init.set_default_header(header_names::ACCEPT, header_values::APPLICATION_JSON);
            init.set_default_header(
                header_names::X_REDIRECT_POLICY,
                header_values::MANUAL_WHEN_CROSS_SPA,
            );
            init.set_default_header(header_names::X_REDIRECT_CODE, SENTINEL_REDIRECT_CODE.as_str());
            init.set_default_header(header_names::X_POWERED_BY, header_values::POWERED_BY);
        }
        if detail.is_startup() {
            init.set_header(header_names::X_IS_STARTUP_FLIGHT, header_values::FLAG_ON);
        }
        init
    }

    async fn start(
        &self,
        init: RequestInit,
        detail: NavigationDetail,
        launch: Launch,
    ) -> Result<DispatchOutcome, DispatchError> {
        let retry = RetryNavigation {
            navigator: self.clone(),
            init: init.clone(),
            detail: detail.clone(),
            launch,
        };

        let prepared = self.prepare(init, &detail, launch.with_defaults);
        let storages = match &self.inner.storage {
            Some(provider) => provider.storages_for(&prepared.materialize()?),
            None => StorageSet::new(),
        };
        let port = ClientPort::new();
        let late = port.messages();
        let responder =
            Responder::new(Some(port.clone())).with_metrics(Arc::clone(&self.inner.metrics));
        let event = RequestEvent::create(prepared, detail, storages, Some(port.clone()))?
            .with_responder(responder);
        let receiver = event.immediate().ok_or_else(|| {
            DispatchError::DispatchFailed(anyhow::anyhow!("immediate response already claimed"))
        })?;

        let signal = RetryToken::new();
        if launch.supersede {
            let previous = self.current().replace(signal.clone());
            if let Some(previous) = previous {
                previous.cancel();
                debug!("previous navigation superseded");
            }
        }

        let span = info_span!("dispatch", event_id = event.id(), url = %event.request().url);
        let navigator = self.clone();
        tokio::spawn(navigator.complete(event, signal).instrument(span));

        let (mut immediate, error) = match receiver.wait().await {
            Ok(response) => (response, None),
            Err(error) => (
                Response::internal_error(error.to_string()),
                Some(Arc::new(error)),
            ),
        };

        let late = if port.is_messaging() {
            immediate.set_header(
                header_names::X_BACKGROUND_ACTIVITY,
                &background_channel(port.port_id()),
            )?;
            late
        } else {
            port.close();
            None
        };

        let retry = matches!(
            immediate.status,
            StatusCode::NOT_FOUND | StatusCode::INTERNAL_SERVER_ERROR
        )
        .then_some(retry);

        Ok(DispatchOutcome {
            immediate,
            late,
            retry,
            error,
        })
    }

    async fn complete(self, mut event: RequestEvent, signal: RetryToken) {
        let inner = &self.inner;
        inner.metrics.record_dispatch();
        let ctx = DispatchContext::new();
        let mut state = ProcessState::new().with_signal(signal.clone());

        let result = inner
            .dispatcher
            .dispatch(&mut event, &ctx, &inner.terminal, &mut state)
            .await;
        let delivery = match result {
            Ok(mut response) => {
                if let Err(error) = event.storages().commit_all(&mut response).await {
                    warn!(error = %error, "storage commit failed");
                }
                info!(
                    status = %response.status,
                    phase = ?state.phase(),
                    attempts = state.attempts(),
                    "dispatch complete"
                );
                event.resolve(response)
            }
            Err(error) => {
                inner.metrics.record_dispatch_failure();
                warn!(error = %error, "dispatch failed");
                event.fail(error)
            }
        };
        if let Err(error) = delivery {
            warn!(error = %error, "final response not delivered");
        }

        let mut current = self.current();
        if current.as_ref().is_some_and(|token| token.same_as(&signal)) {
            current.take();
        }
    }
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("origin", &self.inner.config.origin.as_str())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

/// Assembles a [`Navigator`].
pub struct NavigatorBuilder {
    config: NavigatorConfig,
    pipeline: Pipeline,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn CacheStore>>,
    matcher: Option<Arc<dyn UrlMatcher>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    redirector: Option<Arc<dyn Redirector>>,
    storage: Option<Arc<dyn StorageProvider>>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl NavigatorBuilder {
    pub fn new(config: NavigatorConfig) -> Self {
        Self {
            config,
            pipeline: Pipeline::new(),
            transport: None,
            store: None,
            matcher: None,
            sleeper: None,
            redirector: None,
            storage: None,
            metrics: None,
        }
    }

    /// Append a middleware to the pipeline.
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.pipeline = self.pipeline.with(middleware);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// The remote transport. Required.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The cache store; defaults to an in-memory store.
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The URL matcher; defaults to path templates against the origin.
    pub fn with_matcher(mut self, matcher: Arc<dyn UrlMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn with_redirector(mut self, redirector: Arc<dyn Redirector>) -> Self {
        self.redirector = Some(redirector);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageProvider>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and assemble the navigator.
    pub fn build(self) -> Result<Navigator, DispatchError> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| DispatchError::Config("no transport configured".into()))?;
        let transport: Arc<dyn Transport> = match self.config.timeout {
            Some(timeout) => Arc::new(TimeoutTransport::new(transport, timeout)),
            None => transport,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryCacheStore::new()) as Arc<dyn CacheStore>);
        let matcher = self
            .matcher
            .unwrap_or_else(|| {
                Arc::new(PathTemplateMatcher::new(self.config.origin.clone())) as Arc<dyn UrlMatcher>
            });
        let metrics = self.metrics.unwrap_or_default();

        let executor = StrategyExecutor::new(store, transport, self.config.cache.clone(), matcher)
            .with_metrics(Arc::clone(&metrics));
        let mut dispatcher = Dispatcher::new(self.pipeline)
            .with_policy(self.config.retry)
            .with_metrics(Arc::clone(&metrics));
        if let Some(sleeper) = self.sleeper {
            dispatcher = dispatcher.with_sleeper(sleeper);
        }
        if let Some(redirector) = self.redirector {
            dispatcher = dispatcher.with_redirector(redirector);
        }

        info!(
            origin = %self.config.origin,
            middlewares = dispatcher.pipeline().len(),
            "navigator ready"
        );
        Ok(Navigator {
            inner: Arc::new(NavigatorInner {
                terminal: CrossLayerFetch::new(executor.clone()),
                config: self.config,
                executor,
                dispatcher,
                storage: self.storage,
                metrics,
                current: Mutex::new(None),
            }),
        })
    }
}

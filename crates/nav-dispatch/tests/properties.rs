//! Dispatch guarantees checked end to end across the engine crates.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nav_cache::{
    select_strategy, FetchingStrategy, InMemoryCacheStore, PathTemplateMatcher, RequestConfig,
    StrategyExecutor,
};
use nav_core::{header_names, Request, RequestInit, Response, StatusCode, StorageSet};
use nav_data::{RecordingSleeper, RetryToken};
use nav_dispatch::{
    ChannelRedirector, CrossLayerFetch, DispatchContext, DispatchError, Dispatcher, Middleware,
    NavigationDetail, Next, Pipeline, ProcessState, RequestEvent, RetryPhase,
};

use common::{origin, retry_after, url, ScriptedTransport};

fn event(path: &str) -> RequestEvent {
    RequestEvent::create(
        RequestInit::new(url(path)),
        NavigationDetail::default(),
        StorageSet::new(),
        None,
    )
    .unwrap()
}

fn executor(
    transport: Arc<ScriptedTransport>,
    store: &InMemoryCacheStore,
    config: RequestConfig,
) -> StrategyExecutor {
    StrategyExecutor::new(
        Arc::new(store.clone()),
        transport,
        config,
        Arc::new(PathTemplateMatcher::new(origin())),
    )
}

fn network_only() -> RequestConfig {
    RequestConfig::new().with_default_strategy(FetchingStrategy::NetworkOnly)
}

// === At-most-one resolution ===

#[tokio::test]
async fn test_event_resolves_at_most_once() {
    let event = event("/cart");
    let immediate = event.immediate().unwrap();

    event.resolve(Response::ok("first")).unwrap();
    for _ in 0..3 {
        assert!(matches!(
            event.resolve(Response::ok("again")),
            Err(DispatchError::AlreadyResolved)
        ));
    }
    assert_eq!(immediate.wait().await.unwrap().text().await.unwrap(), "first");
}

// === Pipeline ordering ===

struct Named {
    name: &'static str,
    trace: Arc<Mutex<Vec<&'static str>>>,
    call_next: bool,
}

#[async_trait]
impl Middleware for Named {
    async fn handle(
        &self,
        event: &mut RequestEvent,
        _ctx: &DispatchContext,
        next: Next<'_>,
    ) -> anyhow::Result<Response> {
        self.trace.lock().unwrap().push(self.name);
        if self.call_next {
            next.run(event).await
        } else {
            Ok(Response::ok(self.name))
        }
    }
}

fn named(name: &'static str, trace: &Arc<Mutex<Vec<&'static str>>>, call_next: bool) -> Named {
    Named {
        name,
        trace: Arc::clone(trace),
        call_next,
    }
}

#[tokio::test]
async fn test_chain_runs_in_order_to_terminal() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let transport = ScriptedTransport::new();
    let terminal = CrossLayerFetch::new(executor(
        transport.clone(),
        &InMemoryCacheStore::new(),
        network_only(),
    ));
    let pipeline = Pipeline::new()
        .with(named("A", &trace, true))
        .with(named("B", &trace, true))
        .with(named("C", &trace, true));

    let response = pipeline
        .dispatch(&mut event("/page"), &DispatchContext::new(), &terminal)
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "default");
    assert_eq!(*trace.lock().unwrap(), vec!["A", "B", "C"]);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_short_circuit_skips_rest_and_terminal() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let transport = ScriptedTransport::new();
    let terminal = CrossLayerFetch::new(executor(
        transport.clone(),
        &InMemoryCacheStore::new(),
        network_only(),
    ));
    let pipeline = Pipeline::new()
        .with(named("A", &trace, true))
        .with(named("B", &trace, false))
        .with(named("C", &trace, true));

    let response = pipeline
        .dispatch(&mut event("/page"), &DispatchContext::new(), &terminal)
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "B");
    assert_eq!(*trace.lock().unwrap(), vec!["A", "B"]);
    assert_eq!(transport.calls(), 0);
}

// === Strategy priority ===

fn with_list(config: RequestConfig, strategy: FetchingStrategy, pattern: &str) -> RequestConfig {
    match strategy {
        FetchingStrategy::CacheOnly => config.with_cache_only([pattern]),
        FetchingStrategy::NetworkOnly => config.with_network_only([pattern]),
        FetchingStrategy::CacheFirst => config.with_cache_first([pattern]),
        FetchingStrategy::NetworkFirst => config.with_network_first([pattern]),
    }
}

#[test]
fn test_higher_priority_list_wins_every_pair() {
    let matcher = PathTemplateMatcher::new(origin());
    let target = origin().join("/shared/logo.svg").unwrap();
    let order = FetchingStrategy::PRIORITY;

    for (i, higher) in order.iter().enumerate() {
        for lower in &order[i + 1..] {
            let config = RequestConfig::new().with_default_strategy(FetchingStrategy::NetworkFirst);
            let config = with_list(config, *lower, "/shared/*");
            let config = with_list(config, *higher, "/shared/:file");
            assert_eq!(
                select_strategy(&target, &config, &matcher).unwrap(),
                *higher,
                "{higher} should beat {lower}"
            );
        }
    }
}

#[test]
fn test_default_applies_when_nothing_matches() {
    let matcher = PathTemplateMatcher::new(origin());
    let config = RequestConfig::new()
        .with_cache_only(["/static/*"])
        .with_default_strategy(FetchingStrategy::CacheFirst);
    let target = origin().join("/about").unwrap();
    assert_eq!(
        select_strategy(&target, &config, &matcher).unwrap(),
        FetchingStrategy::CacheFirst
    );
}

// === Redirect normalization ===

#[tokio::test]
async fn test_sentinel_redirect_is_restored_and_triggered_once() {
    let transport = ScriptedTransport::with_script(vec![Ok(Response::ok("")
        .with_header(header_names::X_REDIRECT_CODE, "302")
        .with_header(header_names::LOCATION, "/login"))]);
    let terminal = CrossLayerFetch::new(executor(
        transport,
        &InMemoryCacheStore::new(),
        network_only(),
    ));
    let (redirector, mut redirects) = ChannelRedirector::new();
    let dispatcher = Dispatcher::new(Pipeline::new()).with_redirector(Arc::new(redirector));

    let response = dispatcher
        .dispatch(
            &mut event("/account"),
            &DispatchContext::new(),
            &terminal,
            &mut ProcessState::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(redirects.try_recv().unwrap().location, "/login");
    assert!(redirects.try_recv().is_err());
}

// === Retry convergence ===

#[tokio::test]
async fn test_retry_loop_converges() {
    let transport = ScriptedTransport::with_script(vec![
        Ok(retry_after("1")),
        Ok(retry_after("1")),
        Ok(Response::ok("ready")),
    ]);
    let terminal = CrossLayerFetch::new(executor(
        transport.clone(),
        &InMemoryCacheStore::new(),
        network_only(),
    ));
    let sleeper = Arc::new(RecordingSleeper::new());
    let dispatcher = Dispatcher::new(Pipeline::new()).with_sleeper(sleeper.clone());
    let mut state = ProcessState::new();

    let response = dispatcher
        .dispatch(&mut event("/report"), &DispatchContext::new(), &terminal, &mut state)
        .await
        .unwrap();

    assert_eq!(response.text().await.unwrap(), "ready");
    assert_eq!(sleeper.waits(), vec![Duration::from_secs(1); 2]);
    assert_eq!(transport.calls(), 3);
    let retried: Vec<bool> = transport.seen().iter().map(|s| s.retry).collect();
    assert_eq!(retried, vec![false, true, true]);
    assert_eq!(state.phase(), RetryPhase::Idle);
}

// === Cancellation ===

#[tokio::test]
async fn test_cancel_during_wait_stops_redispatch() {
    let transport = ScriptedTransport::with_script(vec![Ok(retry_after("30"))]);
    let terminal = CrossLayerFetch::new(executor(
        transport.clone(),
        &InMemoryCacheStore::new(),
        network_only(),
    ));
    let signal = RetryToken::new();
    let abort = signal.clone();
    let sleeper = Arc::new(RecordingSleeper::with_hook(move |_, _| abort.cancel()));
    let dispatcher = Dispatcher::new(Pipeline::new()).with_sleeper(sleeper.clone());
    let mut state = ProcessState::new().with_signal(signal);

    let response = dispatcher
        .dispatch(&mut event("/report"), &DispatchContext::new(), &terminal, &mut state)
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(sleeper.wait_count(), 1);
    assert_eq!(transport.calls(), 1);
    assert_eq!(state.phase(), RetryPhase::Cancelled);
}

// === Cache write eligibility ===

#[tokio::test]
async fn test_only_get_200_basic_is_cached() {
    let store = InMemoryCacheStore::new();
    let transport = ScriptedTransport::with_script(vec![
        Ok(Response::ok("created")),
        Ok(Response::ok("catalog")),
        Ok(Response::not_found()),
    ]);
    let exec = executor(transport, &store, RequestConfig::new().with_network_first(["/*"]));

    let post = RequestInit::new(url("/orders"))
        .with_method("POST")
        .with_body("{}")
        .materialize()
        .unwrap();
    exec.network_first(post).await.unwrap();
    assert_eq!(store.put_count(), 0);

    let catalog = origin().join("/catalog").unwrap();
    exec.network_first(Request::get(catalog.clone())).await.unwrap();
    assert!(store.contains("webflo", &catalog).await);

    let missing = origin().join("/missing").unwrap();
    exec.network_first(Request::get(missing.clone())).await.unwrap();
    assert!(!store.contains("webflo", &missing).await);
    assert_eq!(store.put_count(), 1);
}

// === Idempotent cloning ===

#[tokio::test]
async fn test_clone_after_body_read_is_unconsumed() {
    let event = RequestEvent::create(
        RequestInit::new(url("/checkout"))
            .with_method("POST")
            .with_body("card=4242"),
        NavigationDetail::default(),
        StorageSet::new(),
        None,
    )
    .unwrap();

    assert_eq!(event.request().text().await.unwrap(), "card=4242");
    assert!(event.request().body.is_consumed());

    let first = event.clone_for_retry().unwrap();
    let second = first.clone_for_retry().unwrap();
    assert!(!first.request().body.is_consumed());
    assert_eq!(first.request().text().await.unwrap(), "card=4242");
    assert_eq!(second.request().text().await.unwrap(), "card=4242");
}

//! HTTP handlers for mart server.
//!
//! This module handles the request lifecycle of publishers and long-polling
//! subscribers.

use crate::background::{self, Persistence};
use crate::config::Config;
use crate::metrics::{self, SubscribeMetricsGuard};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use mart_core::{
    release_all, wait_any, Backlog, ChannelConfig, ChannelError, Disconnect, Poll, Registry,
    Replay, Wakeup,
};
use mart_protocol::{Limits, ProtocolError, PubResponse, PublishParams, SubResponse, SubscribeParams};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Request counters reported by `/stats`.
#[derive(Debug, Default)]
pub struct RequestCounters {
    /// Subscribe requests currently in progress.
    pub sub_active: AtomicI64,
    /// Subscribe requests since start.
    pub sub_all: AtomicU64,
    /// Publish requests since start.
    pub pub_all: AtomicU64,
    /// List requests since start.
    pub list: AtomicU64,
}

/// Shared server state.
pub struct AppState {
    /// The channel registry.
    pub registry: Arc<Registry>,
    /// Channel configuration for `/pub` requests that omit parameters.
    pub defaults: ChannelConfig,
    /// Request limits.
    pub limits: Limits,
    /// How long a poll may stay parked.
    pub poll_timeout: Option<Duration>,
    /// Request counters.
    pub counters: RequestCounters,
    /// Durability events abandoned by the writer, if persistence is on.
    pub sink_failures: Option<Arc<AtomicU64>>,
    /// Flipped to `true` when the server starts shutting down.
    pub shutdown: watch::Sender<bool>,
    /// Server start time.
    pub started: Instant,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: &Config, registry: Arc<Registry>, shutdown: watch::Sender<bool>) -> Self {
        Self {
            registry,
            defaults: config.channel.to_config(),
            limits: config.limits.to_limits(),
            poll_timeout: config.poll.timeout(),
            counters: RequestCounters::default(),
            sink_failures: None,
            shutdown,
            started: Instant::now(),
        }
    }

    /// Report durability failures from `failures`.
    #[must_use]
    pub fn with_sink_failures(mut self, failures: Arc<AtomicU64>) -> Self {
        self.sink_failures = Some(failures);
        self
    }
}

/// Ends a parked poll when its deadline passes or the server shuts down.
struct PollDeadline {
    deadline: Option<tokio::time::Instant>,
    shutdown: watch::Receiver<bool>,
}

impl PollDeadline {
    fn new(timeout: Option<Duration>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            deadline: timeout.map(|t| tokio::time::Instant::now() + t),
            shutdown,
        }
    }
}

#[async_trait]
impl Disconnect for PollDeadline {
    async fn closed(&self) {
        let mut shutdown = self.shutdown.clone();
        let stopping = async move {
            // A dropped sender also means the server is gone.
            let _ = shutdown.wait_for(|stop| *stop).await;
        };
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = tokio::time::sleep_until(deadline) => {}
                () = stopping => {}
            },
            None => stopping.await,
        }
    }
}

/// Decrements the active subscribe count on drop.
struct ActiveSubscribe<'a>(&'a AtomicI64);

impl<'a> ActiveSubscribe<'a> {
    fn new(counter: &'a AtomicI64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveSubscribe<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.limits.max_message_size;
    Router::new()
        .route("/pub", get(pub_handler).post(pub_handler))
        .route("/sub", get(sub_handler))
        .route("/list", get(list_handler))
        .route("/clear", post(clear_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if persistence cannot be opened or the server fails to
/// start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let persistence = if config.persist.enabled {
        Some(Persistence::open(&config.persist).await?)
    } else {
        info!("Persistence disabled");
        None
    };

    let registry = Arc::new(Registry::with_durability(
        persistence.as_ref().map(Persistence::durability).unwrap_or_default(),
    ));
    if let Some(persistence) = &persistence {
        persistence.restore(&registry).await?;
    }

    let (shutdown_tx, _) = watch::channel(false);
    let mut state = AppState::new(&config, Arc::clone(&registry), shutdown_tx.clone());
    if let Some(persistence) = &persistence {
        state = state.with_sink_failures(persistence.failures());
    }
    let state = Arc::new(state);

    let mut tasks = Vec::new();
    if let Some(every) = config.expiry.interval() {
        tasks.push(background::spawn_sweeper(
            Arc::clone(&registry),
            every,
            shutdown_tx.subscribe(),
        ));
    }
    if config.metrics.enabled {
        tasks.push(background::spawn_metrics_reporter(
            Arc::clone(&state),
            shutdown_tx.subscribe(),
        ));
    }

    let app = router(Arc::clone(&state));
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("mart server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await?;

    shutdown_tx.send_replace(true);
    for task in tasks {
        let _ = task.await;
    }
    if let Some(persistence) = persistence {
        let stats = persistence.shutdown().await;
        info!(applied = stats.applied, failed = stats.failed, "Persistence drained");
    }

    info!("mart server stopped");
    Ok(())
}

/// Resolve on Ctrl-C and tell parked polls to return.
async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    shutdown.send_replace(true);
}

fn reject(status: StatusCode, reason: impl Into<String>) -> Response {
    (status, Json(SubResponse::error(reason))).into_response()
}

fn reject_protocol(endpoint: &'static str, err: &ProtocolError) -> Response {
    debug!(endpoint, error = %err, "Rejected request");
    metrics::record_rejected(endpoint);
    let status = match err {
        ProtocolError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    reject(status, err.to_string())
}

fn reject_channel(err: &ChannelError) -> Response {
    warn!(error = %err, "Channel unavailable");
    reject(StatusCode::NOT_FOUND, err.to_string())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Publish the request body, or only configure the channel if it is empty.
async fn pub_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    state.counters.pub_all.fetch_add(1, Ordering::Relaxed);

    let params = match PublishParams::from_pairs(query, &state.defaults, &state.limits) {
        Ok(params) => params,
        Err(e) => return reject_protocol("pub", &e),
    };
    if let Err(e) = params.check_payload(&body, &state.limits) {
        return reject_protocol("pub", &e);
    }

    let channel = state.registry.get_or_create(&params.channel, params.config);
    if body.is_empty() {
        debug!(channel = %params.channel, "Channel configured without publishing");
        return Json(PubResponse::new(0)).into_response();
    }

    let size = body.len();
    match channel.publish(body).await {
        Ok(marker) => {
            metrics::record_publish(size);
            debug!(channel = %params.channel, marker, size, "Published");
            Json(PubResponse::new(marker)).into_response()
        }
        Err(e) => reject_channel(&e),
    }
}

/// Long-poll one or more channels.
async fn sub_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    let _metrics_guard = SubscribeMetricsGuard::new();
    let _active = ActiveSubscribe::new(&state.counters.sub_active);
    state.counters.sub_all.fetch_add(1, Ordering::Relaxed);

    let params = match SubscribeParams::from_pairs(query) {
        Ok(params) => params,
        Err(e) => return reject_protocol("sub", &e),
    };
    let identity = params.identity.as_deref();

    let channels: Vec<_> = params
        .channels
        .iter()
        .map(|(name, marker)| (state.registry.get(name), *marker))
        .collect();

    // Backlog anywhere is answered at once, without parking anywhere.
    let mut replay = Replay::new();
    for (channel, marker) in &channels {
        if let Some(backlog) = channel.backlog(*marker) {
            replay.insert(channel.name(), backlog);
        }
    }
    if !replay.is_empty() {
        debug!(channels = replay.len(), "Returning backlog");
        return Json(SubResponse::from_replay(&replay)).into_response();
    }

    let mut subscriptions = Vec::with_capacity(channels.len());
    for (channel, marker) in &channels {
        match channel.poll(*marker, identity) {
            Poll::Parked(sub) => subscriptions.push(sub),
            // Published between the check above and parking.
            Poll::Backlog(backlog) => replay.insert(channel.name(), backlog),
        }
    }
    if !replay.is_empty() {
        release_all(subscriptions, &mut replay);
        return Json(SubResponse::from_replay(&replay)).into_response();
    }

    debug!(channels = subscriptions.len(), cid = ?identity, "Poll parked");
    let disconnect = PollDeadline::new(state.poll_timeout, state.shutdown.subscribe());
    let wakeup = wait_any(&mut subscriptions, &disconnect).await;
    if let Wakeup::Message { channel, message } = &wakeup {
        replay.insert(channel.as_str(), Backlog::delivered(Arc::clone(message)));
    }
    // Sibling polls may have been delivered to as well.
    release_all(subscriptions, &mut replay);

    if !replay.is_empty() {
        debug!(channels = replay.len(), "Poll delivered");
        return Json(SubResponse::from_replay(&replay)).into_response();
    }
    match wakeup {
        Wakeup::Superseded { channel } => {
            debug!(channel = %channel, cid = ?identity, "Poll superseded");
            reject(StatusCode::CONFLICT, "superseded")
        }
        Wakeup::Message { .. } | Wakeup::Disconnected => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Ask the durability sink to log everything it holds.
async fn list_handler(State(state): State<Arc<AppState>>) -> &'static str {
    state.counters.list.fetch_add(1, Ordering::Relaxed);
    metrics::record_list();
    if !state.registry.dump().await {
        debug!("List requested without persistence");
    }
    "ok\n"
}

/// Drop every buffered message of a channel.
async fn clear_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(name) = query.get("channel").filter(|c| !c.is_empty()) else {
        return reject_protocol("clear", &ProtocolError::MissingChannel);
    };
    match state.registry.clear(name).await {
        Some(cleared) => {
            info!(channel = %name, cleared, "Channel cleared");
            Json(serde_json::json!({ "cleared": cleared })).into_response()
        }
        None => reject(StatusCode::NOT_FOUND, format!("unknown channel: {name}")),
    }
}

/// Body returned by `/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Channels in the registry, placeholders included.
    pub channels: usize,
    /// Subscribers parked across all channels.
    pub parked_subscribers: usize,
    /// Messages held in channel buffers.
    pub buffered_messages: usize,
    /// Durability events waiting to be written.
    pub sink_queue_depth: usize,
    /// Durability events dropped by a full queue.
    pub sink_dropped: u64,
    /// Durability events abandoned after retries.
    pub sink_failures: u64,
    /// Request counters.
    pub requests: RequestStats,
}

/// Request counters as reported by `/stats`.
#[derive(Debug, Serialize)]
pub struct RequestStats {
    /// Subscribe requests in progress.
    #[serde(rename = "nSub")]
    pub sub_active: i64,
    /// Subscribe requests since start.
    #[serde(rename = "nSubAll")]
    pub sub_all: u64,
    /// Publish requests since start.
    #[serde(rename = "nPubAll")]
    pub pub_all: u64,
    /// List requests since start.
    #[serde(rename = "nList")]
    pub list: u64,
}

impl StatsResponse {
    /// Snapshot the current state.
    #[must_use]
    pub fn collect(state: &AppState) -> Self {
        let stats = state.registry.stats();
        Self {
            uptime_secs: state.started.elapsed().as_secs(),
            channels: stats.channel_count,
            parked_subscribers: stats.parked_subscribers,
            buffered_messages: stats.buffered_messages,
            sink_queue_depth: stats.queued_sink_events,
            sink_dropped: stats.dropped_sink_events,
            sink_failures: state
                .sink_failures
                .as_ref()
                .map_or(0, |f| f.load(Ordering::Relaxed)),
            requests: RequestStats {
                sub_active: state.counters.sub_active.load(Ordering::Relaxed),
                sub_all: state.counters.sub_all.load(Ordering::Relaxed),
                pub_all: state.counters.pub_all.load(Ordering::Relaxed),
                list: state.counters.list.load(Ordering::Relaxed),
            },
        }
    }
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse::collect(&state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use mart_protocol::codec;
    use tower::ServiceExt;

    struct TestServer {
        app: Router,
        state: Arc<AppState>,
    }

    impl TestServer {
        fn new() -> Self {
            Self::with_config(Config::default())
        }

        fn with_config(config: Config) -> Self {
            let (shutdown, _) = watch::channel(false);
            let state = Arc::new(AppState::new(&config, Arc::new(Registry::new()), shutdown));
            Self {
                app: router(Arc::clone(&state)),
                state,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, body)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Bytes) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn publish(&self, uri: &str, payload: &'static str) -> (StatusCode, Bytes) {
            self.send(Request::post(uri).body(Body::from(payload)).unwrap())
                .await
        }

        async fn publish_etag(&self, channel: &str, payload: &'static str) -> String {
            let (status, body) = self.publish(&format!("/pub?channel={channel}"), payload).await;
            assert_eq!(status, StatusCode::OK);
            codec::decode::<PubResponse>(&body).unwrap().etag
        }

        async fn wait_parked(&self, count: usize) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while self.state.registry.stats().parked_subscribers < count {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .unwrap();
        }
    }

    fn sub_body(body: &[u8]) -> SubResponse {
        codec::decode(body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::new();
        let (status, body) = server.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_publish_returns_etag() {
        let server = TestServer::new();
        let etag = server.publish_etag("news", "hello").await;
        assert!(etag.parse::<u64>().unwrap() > 0);
        assert_eq!(server.state.registry.stats().buffered_messages, 1);
    }

    #[tokio::test]
    async fn test_publish_via_get_with_empty_body_only_configures() {
        let server = TestServer::new();
        let (status, body) = server.get("/pub?channel=room&size=3&one2one=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(codec::decode::<PubResponse>(&body).unwrap().etag, "0");

        let channel = server.state.registry.lookup("room").unwrap();
        assert!(channel.is_empty());
        assert_eq!(
            channel.config(),
            Some(ChannelConfig::new(3).with_one2one(true))
        );
    }

    #[tokio::test]
    async fn test_publish_rejections() {
        let server = TestServer::new();

        let (status, body) = server.publish("/pub", "x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(sub_body(&body).error.as_deref(), Some("channel is required"));

        let (status, _) = server.publish("/pub?channel=c&size=big", "x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut config = Config::default();
        config.limits.max_message_size = 4;
        let small = TestServer::with_config(config);
        let (status, _) = small.publish("/pub?channel=c", "too long").await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_subscribe_catches_up_immediately() {
        let server = TestServer::new();
        let first = server.publish_etag("feed", "a").await;
        server.publish_etag("feed", "b").await;
        let last = server.publish_etag("feed", "c").await;

        let (status, body) = server.get(&format!("/sub?feed={first}")).await;
        assert_eq!(status, StatusCode::OK);
        let chan = &sub_body(&body).channels["feed"];
        assert_eq!(chan.payload, vec!["b", "c"]);
        assert_eq!(chan.etag, last);
        assert_eq!(server.state.registry.stats().parked_subscribers, 0);
    }

    #[tokio::test]
    async fn test_subscribe_waits_for_next_publish() {
        let server = Arc::new(TestServer::new());
        server.get("/pub?channel=live").await;

        let poller = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.get("/sub?cid=c1&live=0&other=0").await })
        };
        server.wait_parked(2).await;

        let etag = server.publish_etag("live", "fresh").await;
        let (status, body) = poller.await.unwrap();
        assert_eq!(status, StatusCode::OK);

        let response = sub_body(&body);
        assert_eq!(response.channels.len(), 1);
        assert_eq!(response.channels["live"].etag, etag);
        assert_eq!(response.channels["live"].payload, vec!["fresh"]);
        // The poll on "other" was released with the response.
        assert_eq!(server.state.registry.stats().parked_subscribers, 0);
    }

    #[tokio::test]
    async fn test_poll_returns_every_channel_delivered_before_waking() {
        let server = Arc::new(TestServer::new());
        server.get("/pub?channel=a").await;
        server.get("/pub?channel=b").await;

        let poller = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.get("/sub?a=0&b=0").await })
        };
        server.wait_parked(2).await;

        // Neither publish yields, so both land before the poll wakes.
        let registry = &server.state.registry;
        let pa = registry.lookup("a").unwrap().publish("pa").await.unwrap();
        let pb = registry.lookup("b").unwrap().publish("pb").await.unwrap();

        let (status, body) = poller.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        let response = sub_body(&body);
        assert_eq!(response.channels.len(), 2);
        assert_eq!(response.channels["a"].etag, pa.to_string());
        assert_eq!(response.channels["a"].payload, vec!["pa"]);
        assert_eq!(response.channels["b"].etag, pb.to_string());
        assert_eq!(response.channels["b"].payload, vec!["pb"]);
        assert_eq!(server.state.registry.stats().parked_subscribers, 0);
    }

    #[tokio::test]
    async fn test_one2one_second_poll_supersedes_first() {
        let server = Arc::new(TestServer::new());
        server.get("/pub?channel=private&one2one=true").await;

        let first = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.get("/sub?cid=me&private=0").await })
        };
        server.wait_parked(1).await;
        let second = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.get("/sub?cid=me&private=0").await })
        };

        let (status, body) = first.await.unwrap();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(sub_body(&body).error.as_deref(), Some("superseded"));

        server.wait_parked(1).await;
        server.publish_etag("private", "for you").await;
        let (status, _) = second.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_subscribe_rejections() {
        let server = TestServer::new();
        let (status, body) = server.get("/sub?news=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(sub_body(&body).error.as_deref(), Some("news has no etag"));

        let (status, _) = server.get("/sub?news=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = server.get("/sub?cid=x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_poll_timeout_returns_no_content() {
        let mut config = Config::default();
        config.poll.timeout_ms = 20;
        let server = TestServer::with_config(config);

        let (status, body) = server.get("/sub?idle=0").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
        assert_eq!(server.state.registry.stats().parked_subscribers, 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_parked_polls() {
        let server = Arc::new(TestServer::new());
        let poller = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.get("/sub?quiet=0").await })
        };
        server.wait_parked(1).await;

        server.state.shutdown.send_replace(true);
        let (status, _) = poller.await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_clear() {
        let server = TestServer::new();
        server.publish_etag("c", "1").await;
        server.publish_etag("c", "2").await;

        let clear = |uri: &'static str| Request::post(uri).body(Body::empty()).unwrap();
        let (status, body) = server.send(clear("/clear?channel=c")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["cleared"], 2);

        let (status, _) = server.send(clear("/clear?channel=nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = server.send(clear("/clear")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let server = TestServer::new();
        server.publish_etag("a", "x").await;
        // "a" has backlog past marker 1, so this returns without parking.
        let _ = server.get("/sub?a=1&b=1").await;

        let (status, body) = server.get("/list").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"ok\n");

        let (status, body) = server.get("/stats").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["channels"], 2);
        assert_eq!(json["buffered_messages"], 1);
        assert_eq!(json["requests"]["nPubAll"], 1);
        assert_eq!(json["requests"]["nSubAll"], 1);
        assert_eq!(json["requests"]["nSub"], 0);
        assert_eq!(json["requests"]["nList"], 1);
    }
}

//! Integration Tests against a local HTTP server
//!
//! Drives the reqwest-backed client through the retriever, the refresher and
//! the hosted data layer end to end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{
        header::{ETAG, IF_NONE_MATCH},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use enrichment_store::error::RetrieverError;
use enrichment_store::hosted::{
    DispatchValidator, HostedDataLayer, HttpHostedDataRetriever, ModuleDelegate, TrackRequest,
    ERROR_KEY, QUEUE_REASON_KEY,
};
use enrichment_store::network::{
    EtagResource, HttpClient, RefreshParameters, ReqwestClient, ResourceRefresher,
    ResourceRefresherDelegate, ResourceRetriever,
};
use enrichment_store::storage::MemoryStorage;
use enrichment_store::Config;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

// == Mock Server ==

#[derive(Default)]
struct ServerState {
    flaky_calls: AtomicUsize,
    hosted_calls: AtomicUsize,
}

async fn settings(headers: HeaderMap) -> Response {
    let etag = headers.get(IF_NONE_MATCH).and_then(|value| value.to_str().ok());
    if etag == Some("v1") {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    ([(ETAG, "v1")], r#"{"value":"remote"}"#).into_response()
}

async fn flaky(State(state): State<Arc<ServerState>>) -> Response {
    if state.flaky_calls.fetch_add(1, Ordering::SeqCst) < 3 {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    r#"{"value":"recovered"}"#.into_response()
}

async fn hosted(
    State(state): State<Arc<ServerState>>,
    Path((_account, _profile, file)): Path<(String, String, String)>,
) -> Response {
    state.hosted_calls.fetch_add(1, Ordering::SeqCst);
    match file.as_str() {
        "missing.json" => StatusCode::NOT_FOUND.into_response(),
        "empty.json" => StatusCode::OK.into_response(),
        _ => {
            let id = file.trim_end_matches(".json");
            json!({ "product_name": format!("product {}", id) })
                .to_string()
                .into_response()
        }
    }
}

async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/settings.json", get(settings))
        .route("/flaky.json", get(flaky))
        .route("/dle/:account/:profile/:file", get(hosted))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

// == Helpers ==

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    value: String,
    #[serde(default)]
    etag: Option<String>,
}

impl EtagResource for Settings {
    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

fn settings_builder(body: &[u8], etag: Option<&str>) -> Option<Settings> {
    let mut settings: Settings = serde_json::from_slice(body).ok()?;
    settings.etag = etag.map(str::to_string);
    Some(settings)
}

fn client() -> Arc<dyn HttpClient> {
    Arc::new(ReqwestClient::new())
}

fn retriever() -> ResourceRetriever<Settings> {
    ResourceRetriever::new(client(), settings_builder).with_retry_delay(Duration::from_millis(10))
}

struct ChannelDelegate {
    sender: mpsc::UnboundedSender<String>,
}

impl ModuleDelegate for ChannelDelegate {
    fn request_dequeue(&self, reason: &str) {
        let _ = self.sender.send(reason.to_string());
    }
}

#[derive(Default)]
struct CountingDelegate {
    loaded: AtomicUsize,
    failed: AtomicUsize,
}

impl ResourceRefresherDelegate<Settings> for CountingDelegate {
    fn did_load(&self, _refresher_id: &str, _resource: &Settings) {
        self.loaded.fetch_add(1, Ordering::SeqCst);
    }

    fn did_fail_to_load(&self, _refresher_id: &str, _error: &RetrieverError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

// == Retriever Tests ==

#[tokio::test]
async fn test_retriever_etag_round_trip() {
    let (addr, _) = start_server().await;
    let url = format!("http://{}/settings.json", addr);
    let retriever = retriever();

    let settings = retriever.get_resource(&url, None).await.unwrap();
    assert_eq!(settings.value, "remote");
    assert_eq!(settings.etag.as_deref(), Some("v1"));

    let result = retriever.get_resource(&url, Some("v1")).await;
    assert_eq!(result, Err(RetrieverError::NotModified));
}

#[tokio::test]
async fn test_retriever_recovers_after_server_errors() {
    let (addr, state) = start_server().await;
    let url = format!("http://{}/flaky.json", addr);

    let settings = retriever().get_resource(&url, None).await.unwrap();
    assert_eq!(settings.value, "recovered");
    assert_eq!(state.flaky_calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_retriever_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = retriever()
        .with_max_attempts(2)
        .get_resource(&format!("http://{}/settings.json", addr), None)
        .await;
    assert!(matches!(result, Err(RetrieverError::NoResponse(_))));
}

// == Refresher Tests ==

#[tokio::test]
async fn test_refresher_keeps_resource_on_not_modified() {
    let (addr, _) = start_server().await;
    let parameters = RefreshParameters::new(
        "settings",
        format!("http://{}/settings.json", addr),
        Duration::ZERO,
    )
    .with_file_name("settings");
    let refresher = ResourceRefresher::new(
        retriever(),
        Arc::new(MemoryStorage::new("settings")),
        parameters,
    );
    let delegate = Arc::new(CountingDelegate::default());
    refresher.set_delegate(delegate.clone());

    assert!(refresher.request_refresh().await);
    assert_eq!(delegate.loaded.load(Ordering::SeqCst), 1);
    assert_eq!(refresher.cached_state().etag.as_deref(), Some("v1"));

    assert!(refresher.request_refresh().await);
    assert_eq!(delegate.failed.load(Ordering::SeqCst), 1);
    assert_eq!(refresher.cached_state().consecutive_errors, 0);
    assert_eq!(refresher.read_resource().unwrap().value, "remote");
}

// == Hosted Data Layer Tests ==

fn hosted_config(addr: SocketAddr) -> Config {
    Config {
        account: "acct".to_string(),
        profile: "prof".to_string(),
        hosted_base_url: format!("http://{}/dle", addr),
        hosted_data_layer_keys: HashMap::from([(
            "product_view".to_string(),
            "product_id".to_string(),
        )]),
        ..Config::default()
    }
}

fn product_view(id: &str) -> TrackRequest {
    let data = json!({ "tealium_event": "product_view", "product_id": id });
    TrackRequest::new(data.as_object().cloned().unwrap())
}

async fn next_reason(receiver: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("no dequeue request")
        .unwrap()
}

#[tokio::test]
async fn test_hosted_data_layer_end_to_end() {
    let (addr, state) = start_server().await;
    let layer = HostedDataLayer::new(
        &hosted_config(addr),
        Arc::new(HttpHostedDataRetriever::new(client())),
        Arc::new(MemoryStorage::new("hdl")),
    );
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let delegate: Arc<dyn ModuleDelegate> = Arc::new(ChannelDelegate { sender });
    layer.set_delegate(&delegate);

    let request = product_view("123");
    let (queue, payload) = layer.should_queue(&request);
    assert!(queue);
    assert!(payload.unwrap().contains_key(QUEUE_REASON_KEY));

    assert_eq!(next_reason(&mut receiver).await, "HDL Response Received");

    let (queue, payload) = layer.should_queue(&request);
    assert!(!queue);
    assert_eq!(payload.unwrap()["product_name"], "product 123");

    let (queue, _) = layer.should_queue(&product_view("123"));
    assert!(!queue);
    assert_eq!(state.hosted_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hosted_data_layer_missing_item_is_blacklisted() {
    let (addr, state) = start_server().await;
    let layer = HostedDataLayer::new(
        &hosted_config(addr),
        Arc::new(HttpHostedDataRetriever::new(client())),
        Arc::new(MemoryStorage::new("hdl")),
    );
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let delegate: Arc<dyn ModuleDelegate> = Arc::new(ChannelDelegate { sender });
    layer.set_delegate(&delegate);

    for id in ["missing", "empty"] {
        let request = product_view(id);
        assert!(layer.should_queue(&request).0);
        next_reason(&mut receiver).await;

        let (queue, payload) = layer.should_queue(&request);
        assert!(!queue);
        assert_eq!(
            payload.unwrap()[ERROR_KEY],
            format!("Data layer item {}.json does not exist", id)
        );
    }
    assert_eq!(state.hosted_calls.load(Ordering::SeqCst), 2);
    assert_eq!(layer.stats().failures, 2);
}

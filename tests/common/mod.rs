//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::fmt::MakeWriter;

use ems_gateway::config::{GatewayConfig, PeerConfig};
use ems_gateway::health::HealthAggregator;
use ems_gateway::{HttpServer, Shutdown};

pub const SECRET: &str = "integration-test-secret";

// ---------------------------------------------------------------------------
// Mock peers
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct MockState {
    resources: Arc<HashMap<String, Value>>,
    seen: Arc<Mutex<Vec<HeaderMap>>>,
    failing: Arc<AtomicBool>,
}

/// An HTTP peer serving fixed JSON resources by exact path.
///
/// Paths under `/echo` answer with the path, query and headers received.
/// Everything else is 404. While failing, every request gets a 500.
#[derive(Clone)]
pub struct MockPeer {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockPeer {
    pub async fn start(resources: &[(&str, Value)]) -> Self {
        let state = MockState {
            resources: Arc::new(
                resources
                    .iter()
                    .map(|(path, body)| (path.to_string(), body.clone()))
                    .collect(),
            ),
            ..MockState::default()
        };
        let router = Router::new()
            .fallback(mock_handler)
            .with_state(state.clone());
        let addr = spawn_router(router).await;
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.state.seen.lock().unwrap().len()
    }

    /// Headers of every request received, oldest first.
    pub fn seen_headers(&self) -> Vec<HeaderMap> {
        self.state.seen.lock().unwrap().clone()
    }
}

async fn mock_handler(State(state): State<MockState>, req: Request<Body>) -> Response {
    state.seen.lock().unwrap().push(req.headers().clone());
    if state.failing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "peer failure").into_response();
    }

    let path = req.uri().path();
    if let Some(body) = state.resources.get(path) {
        return Json(body.clone()).into_response();
    }
    if path.starts_with("/echo") {
        let headers: serde_json::Map<String, Value> = req
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    Value::String(v.to_str().unwrap_or_default().to_string()),
                )
            })
            .collect();
        return Json(json!({
            "path": path,
            "query": req.uri().query(),
            "headers": headers,
        }))
        .into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}

/// Employee peer with three employees: 1 in department 10, 2 in a
/// department that does not exist, 3 without a department.
pub async fn employee_peer() -> MockPeer {
    MockPeer::start(&[
        (
            "/employees/1",
            json!({"id": 1, "name": "Ada Lovelace", "position": "Engineer", "departmentId": 10}),
        ),
        (
            "/employees/2",
            json!({"id": 2, "name": "Alan Turing", "position": "Analyst", "departmentId": 99}),
        ),
        ("/employees/3", json!({"id": 3, "name": "Grace Hopper"})),
        ("/actuator/health", json!({"status": "UP"})),
    ])
    .await
}

pub async fn department_peer() -> MockPeer {
    MockPeer::start(&[
        (
            "/departments/10",
            json!({"id": 10, "name": "Research", "location": "London"}),
        ),
        ("/actuator/health", json!({"status": "UP"})),
    ])
    .await
}

/// Serve `router` on an ephemeral port.
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A raw TCP peer that reads the request head, writes `reply` verbatim and
/// then holds the connection open without sending anything else.
///
/// An empty `reply` never answers at all.
pub async fn stalling_peer(reply: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut head = [0u8; 4096];
                let _ = socket.read(&mut head).await;
                let _ = socket.write_all(reply).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    addr
}

/// Send `request` verbatim and read the response until the server closes.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    String::from_utf8_lossy(&response).into_owned()
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Config pointing the two peers at the given base URLs.
pub fn config(employee_url: &str, department_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.hmac_secret = Some(SECRET.to_string());
    config.peers = vec![
        PeerConfig::new("employee-service", employee_url),
        PeerConfig::new("department-service", department_url),
    ];
    config.downstream.timeout_ms = 1_000;
    config.timeouts.connect_secs = 1;
    config
}

pub struct RunningGateway {
    pub addr: SocketAddr,
    pub health: Arc<HealthAggregator>,
    shutdown: Shutdown,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(config: &GatewayConfig) -> RunningGateway {
    let server = HttpServer::new(config).unwrap();
    let health = server.health().clone();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    RunningGateway {
        addr,
        health,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Read a JSON body.
pub async fn json_body(response: reqwest::Response) -> Value {
    response.json::<Value>().await.unwrap()
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn token_expiring_at(roles: &[&str], exp: u64) -> String {
    let claims = json!({
        "sub": "u-42",
        "preferred_username": "jdoe",
        "realm_access": { "roles": roles },
        "exp": exp,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// A valid HS256 token for `jdoe` holding `roles`.
pub fn token(roles: &[&str]) -> String {
    token_expiring_at(roles, now_secs() + 3_600)
}

pub fn expired_token(roles: &[&str]) -> String {
    token_expiring_at(roles, now_secs() - 3_600)
}

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// Collects JSON log lines emitted on the current thread.
///
/// Tests using it run on the current-thread runtime, so gateway tasks log
/// through the same scoped subscriber.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(self.0.clone())
    }
}

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Events with the given target and message.
    pub fn events(&self, target: &str, message: &str) -> Vec<Value> {
        self.lines()
            .into_iter()
            .filter(|line| line["target"] == target && line["fields"]["message"] == message)
            .collect()
    }

    pub fn access_log(&self) -> Vec<Value> {
        self.events("access_log", "request completed")
    }
}

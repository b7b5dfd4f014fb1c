//! Round-robin-by-least-traffic load balancer in front of a pool of
//! `serve` façade instances.
//!
//! Ported from the original implementation's poll-and-forward loop
//! (health-checked backend pool, traffic-weighted backend choice);
//! re-expressed with `axum`/`reqwest` and a `tokio::time::interval`
//! instead of a goroutine-per-backend ticker.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

struct Backend {
    addr: String,
    alive: std::sync::atomic::AtomicBool,
    traffic: AtomicUsize,
}

struct BalancerState {
    client: reqwest::Client,
    backends: Vec<Backend>,
    request_count: AtomicUsize,
}

pub async fn run_balance(
    bind: String,
    backend_addrs: Vec<String>,
    timeout_secs: u64,
    health_interval_secs: u64,
) -> logcask::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| logcask::StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let backends = backend_addrs
        .into_iter()
        .map(|addr| Backend {
            addr,
            alive: std::sync::atomic::AtomicBool::new(true),
            traffic: AtomicUsize::new(0),
        })
        .collect();

    let state = Arc::new(BalancerState {
        client,
        backends,
        request_count: AtomicUsize::new(0),
    });

    spawn_health_checks(Arc::clone(&state), Duration::from_secs(health_interval_secs));

    let app = Router::new()
        .route("/*path", any(forward))
        .route("/", any(forward))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind(&bind)
        .await
        .map_err(logcask::StorageError::Io)?;
    info!(addr = %bind, backends = state.backends.len(), "load balancer listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| logcask::StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(())
}

fn spawn_health_checks(state: Arc<BalancerState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for backend in &state.backends {
                let url = format!("http://{}/metrics", backend.addr);
                let alive = state
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map(|r| r.status().is_success())
                    .unwrap_or(false);
                backend.alive.store(alive, Ordering::Relaxed);
            }
        }
    });
}

/// Picks the alive backend with the least traffic so far, mirroring the
/// original's `chooseServer`.
fn choose_backend(state: &BalancerState) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, backend) in state.backends.iter().enumerate() {
        if !backend.alive.load(Ordering::Relaxed) {
            continue;
        }
        let traffic = backend.traffic.load(Ordering::Relaxed);
        if best.map(|(_, t)| traffic < t).unwrap_or(true) {
            best = Some((i, traffic));
        }
    }
    best.map(|(i, _)| i)
}

async fn forward(
    State(state): State<Arc<BalancerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(idx) = choose_backend(&state) else {
        warn!("no alive backend available");
        return (StatusCode::SERVICE_UNAVAILABLE, "no alive backend".to_string()).into_response();
    };
    let backend = &state.backends[idx];

    let url = format!("http://{}{}", backend.addr, uri);
    let req_cnt = state.request_count.fetch_add(1, Ordering::Relaxed);

    let mut builder = state.client.request(method, &url).body(body);
    for (name, value) in headers.iter() {
        builder = builder.header(name.clone(), value.clone());
    }
    builder = builder.header("lb-req-cnt", req_cnt.to_string());

    match builder.send().await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let bytes = resp.bytes().await.unwrap_or_default();
            backend.traffic.fetch_add(bytes.len(), Ordering::Relaxed);
            (status, bytes).into_response()
        }
        Err(e) => {
            warn!(backend = %backend.addr, error = %e, "backend request failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

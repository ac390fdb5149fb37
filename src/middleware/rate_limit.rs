use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

const WINDOW: Duration = Duration::from_secs(1);
/// Idle client windows are dropped once the map grows past this.
const MAX_TRACKED_CLIENTS: usize = 10_000;
/// Bucket for requests with neither a peer address nor a trusted header.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Resolved client address, inserted into request extensions by
/// [`rps_middleware`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientIp(pub Option<String>);

/// Fixed one-second window per client. Clients are keyed by their socket
/// peer address; proxy headers count only when `trust_forwarded` is set.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    trust_forwarded: bool,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    pub fn new(rps: u32, trust_forwarded: bool) -> Self {
        Self {
            rps: rps.max(1),
            trust_forwarded,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn allow(&self, client: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        if windows.len() > MAX_TRACKED_CLIENTS {
            windows.retain(|_, w| now.duration_since(w.start) < WINDOW);
        }
        let window = windows.entry(client.to_string()).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }

    /// Forwarded address when behind a trusted proxy, else the peer address.
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
        let forwarded = if self.trust_forwarded {
            forwarded_ip(headers)
        } else {
            None
        };
        forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))
    }
}

/// First hop of `X-Forwarded-For`, or `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn rps_middleware(
    State(state): State<RateLimiter>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = state.client_ip(req.headers(), peer);
    let client = ip.clone().unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    if !state.allow(&client, Instant::now()) {
        tracing::debug!(client = %client, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate_limit_exceeded" })),
        )
            .into_response();
    }
    req.extensions_mut().insert(ClientIp(ip));
    next.run(req).await
}

pub fn new_rps_state(rps: u32, trust_forwarded: bool) -> RateLimiter {
    RateLimiter::new(rps, trust_forwarded)
}

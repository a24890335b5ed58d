//! In-memory key-value service to run the load generator against.
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, PoisonError, RwLock,
};
use std::{num::NonZeroU32, time::Duration};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Clone, Debug, Deserialize)]
pub struct PutBody {
    pub value: String,
    /// Milliseconds until the entry expires.
    pub ttl: Option<u64>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct GetBody {
    pub value: String,
}

struct Entry {
    value: String,
    expires: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
struct Inner {
    store: RwLock<HashMap<String, Entry>>,
    limiters: RwLock<HashMap<u32, Arc<DefaultDirectRateLimiter>>>,
    requests: AtomicU64,
}

/// Shared state of a running mock service. Cheap to clone.
#[derive(Clone, Default)]
pub struct MockState {
    inner: Arc<Inner>,
}

impl MockState {
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        {
            let store = self.inner.store.read().unwrap_or_else(PoisonError::into_inner);
            match store.get(key) {
                Some(entry) if entry.live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        debug!("{key} expired");
        self.inner
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        None
    }

    /// Returns whether the key was newly created.
    pub fn put(&self, key: String, value: String, ttl: Option<Duration>) -> bool {
        let entry = Entry {
            value,
            expires: ttl.map(|ttl| Instant::now() + ttl),
        };

        self.inner
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry)
            .is_none()
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner
            .store
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Number of stored entries, expired ones included until they are next read.
    pub fn len(&self) -> usize {
        self.inner
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requests served since start.
    pub fn requests(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }

    /// Admit a request under a shared limit of `max_rps`. Over the limit is a 503.
    fn admit(&self, max_rps: u32) -> Result<(), StatusCode> {
        let Some(max_rps) = NonZeroU32::new(max_rps) else {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        };

        let read = self
            .inner
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&max_rps.get())
            .cloned();
        let limiter = match read {
            Some(limiter) => limiter,
            None => self
                .inner
                .limiters
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(max_rps.get())
                .or_insert_with(|| Arc::new(rate_limiter(max_rps)))
                .clone(),
        };

        limiter
            .check()
            .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)
    }
}

pub fn app(state: MockState) -> Router {
    Router::new()
        .route("/kvs/:key", get(get_key).put(put_key).delete(delete_key))
        .route(
            "/delay/ms/:delay_ms/kvs/:key",
            get(delayed_get).put(delayed_put),
        )
        .route("/max/:max_rps/kvs/:key", get(limited_get).put(limited_put))
        .route("/unavailable/kvs/:key", get(unavailable).put(unavailable))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, app(MockState::default())).await
}

/// Serve on an ephemeral local port in the background.
pub async fn spawn() -> std::io::Result<(SocketAddr, MockState)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = MockState::default();

    let app = app(state.clone());
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!("Mock service stopped: {err}");
        }
    });

    Ok((addr, state))
}

async fn get_key(
    State(state): State<MockState>,
    Path(key): Path<String>,
) -> Result<Json<GetBody>, StatusCode> {
    state.inner.requests.fetch_add(1, Ordering::Relaxed);
    state
        .get(&key)
        .map(|value| Json(GetBody { value }))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn put_key(
    State(state): State<MockState>,
    Path(key): Path<String>,
    Json(body): Json<PutBody>,
) -> StatusCode {
    state.inner.requests.fetch_add(1, Ordering::Relaxed);
    let ttl = body.ttl.filter(|ms| *ms > 0).map(Duration::from_millis);
    if state.put(key, body.value, ttl) {
        StatusCode::CREATED
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn delete_key(State(state): State<MockState>, Path(key): Path<String>) -> StatusCode {
    state.inner.requests.fetch_add(1, Ordering::Relaxed);
    if state.delete(&key) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn delayed_get(
    state: State<MockState>,
    Path((delay_ms, key)): Path<(u64, String)>,
) -> Result<Json<GetBody>, StatusCode> {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    get_key(state, Path(key)).await
}

async fn delayed_put(
    state: State<MockState>,
    Path((delay_ms, key)): Path<(u64, String)>,
    body: Json<PutBody>,
) -> StatusCode {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    put_key(state, Path(key), body).await
}

async fn limited_get(
    state: State<MockState>,
    Path((max_rps, key)): Path<(u32, String)>,
) -> Result<Json<GetBody>, StatusCode> {
    state.admit(max_rps)?;
    get_key(state, Path(key)).await
}

async fn limited_put(
    state: State<MockState>,
    Path((max_rps, key)): Path<(u32, String)>,
    body: Json<PutBody>,
) -> StatusCode {
    if let Err(status) = state.admit(max_rps) {
        return status;
    }
    put_key(state, Path(key), body).await
}

async fn unavailable(State(state): State<MockState>) -> StatusCode {
    state.inner.requests.fetch_add(1, Ordering::Relaxed);
    StatusCode::SERVICE_UNAVAILABLE
}

pub fn rate_limiter(max_rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(max_rps))
}

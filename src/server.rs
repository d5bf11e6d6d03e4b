//! HTTP frame server: axum router and request handlers.
//!
//! Frames come out of the shared [`FrameServer`] one at a time, either as a
//! single response (`/next`) or as an endless stream over one connection
//! (`/stream`). The wire format is chosen once at startup ([`WireMode`]).
//!
//! ## Rust concepts
//! - axum extractors: `State`
//! - `spawn_blocking` for cache work that touches the filesystem
//! - One spawned task per stream, feeding the response body through a
//!   bounded channel; a closed channel means the client went away
//! - `tokio::sync::watch` as a shutdown signal every stream observes

use crate::FrameSize;
use crate::cache::{CacheStatus, FrameServer};
use crate::wire::{self, JPEG_CONTENT_TYPE, MJPEG_CONTENT_TYPE, RAW_CONTENT_TYPE};
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;

// ── App State ────────────────────────────────────────────────────────

/// Wire format served on `/next` and `/stream`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WireMode {
    /// JPEG bytes; `/stream` is `multipart/x-mixed-replace`
    Mjpeg,
    /// Raw big-endian RGB565, `width × height × 2` bytes per frame
    Rgb565,
}

/// Timing knobs for `/stream`.
#[derive(Clone, Copy, Debug)]
pub struct StreamSettings {
    /// Pause when no frame is available before asking again
    pub idle_wait: Duration,
    /// A client that does not accept a frame within this time is dropped
    pub write_timeout: Duration,
    /// Minimum time between two frames; `None` sends as fast as possible
    pub min_frame_interval: Option<Duration>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            idle_wait: Duration::from_secs(1),
            write_timeout: Duration::from_secs(10),
            min_frame_interval: None,
        }
    }
}

/// Shared application state, passed to every handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Frame cache and rotation cursor
    pub frames: Arc<FrameServer>,
    pub mode: WireMode,
    /// Frame size promised to RGB565 clients
    pub size: FrameSize,
    pub stream: StreamSettings,
    /// Flips to `true` when the process is shutting down
    pub shutdown: watch::Receiver<bool>,
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(get_index, get_next, get_stream, get_count, get_status),
    components(schemas(ServerStatus, CacheStatus, WireMode, FrameSize)),
    tags(
        (name = "frames", description = "Frame delivery endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "GIF Frame Server",
        version = env!("CARGO_PKG_VERSION"),
        description = "Serves prepared animation frames to an ESP32 display"
    )
)]
pub struct ApiDoc;

// ── Response types ───────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ServerStatus {
    pub cache: CacheStatus,
    pub mode: WireMode,
    pub size: FrameSize,
    /// Server version
    pub version: String,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all endpoints. Unknown paths answer 404.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/next", get(get_next))
        .route("/stream", get(get_stream))
        .route("/count", get(get_count))
        .route("/status", get(get_status))
        .route("/api-docs/openapi.json", get(get_openapi))
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run `f` against the frame cache on the blocking pool.
///
/// Cache access may reload from disk, which must not stall the runtime.
async fn with_frames<T, F>(state: &AppState, f: F) -> Result<T, (StatusCode, String)>
where
    T: Send + 'static,
    F: FnOnce(&FrameServer) -> T + Send + 'static,
{
    let frames = state.frames.clone();
    tokio::task::spawn_blocking(move || f(&frames))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Turn a cached JPEG into the bytes the current mode sends.
///
/// Returns `None` when an RGB565 conversion fails; the frame is skipped.
fn encode_frame(jpeg: Bytes, mode: WireMode, size: FrameSize) -> Option<Bytes> {
    match mode {
        WireMode::Mjpeg => Some(jpeg),
        WireMode::Rgb565 => match wire::jpeg_to_rgb565(&jpeg, size) {
            Ok(raw) => Some(Bytes::from(raw)),
            Err(e) => {
                tracing::warn!("Skipping undecodable frame: {}", e);
                None
            }
        },
    }
}

/// Advance the rotation and encode the frame for the wire.
async fn next_payload(state: &AppState) -> Result<Option<Bytes>, (StatusCode, String)> {
    let (mode, size) = (state.mode, state.size);
    with_frames(state, move |frames| {
        frames
            .next_frame()
            .and_then(|jpeg| encode_frame(jpeg, mode, size))
    })
    .await
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET / — human-readable status page
#[utoipa::path(
    get,
    path = "/",
    tag = "system",
    responses(
        (status = 200, description = "HTML page with the frame count")
    )
)]
async fn get_index(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, String)> {
    let count = with_frames(&state, |frames| frames.frame_count()).await?;
    Ok(Html(format!(
        "<h1>ESP32 Frame Server</h1><p>{count} frames</p>\
         <p>Available endpoints: <a href='/count'>/count</a>, <a href='/next'>/next</a>, \
         <a href='/stream'>/stream</a>, <a href='/status'>/status</a></p>"
    )))
}

/// GET /next — the next frame in rotation
#[utoipa::path(
    get,
    path = "/next",
    tag = "frames",
    responses(
        (status = 200, description = "One frame (JPEG, or raw RGB565 in rgb565 mode)", body = Vec<u8>),
        (status = 404, description = "No frames available")
    )
)]
async fn get_next(State(state): State<AppState>) -> Response {
    let payload = match next_payload(&state).await {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let Some(data) = payload else {
        return (StatusCode::NOT_FOUND, "No frames available").into_response();
    };

    let content_type = match state.mode {
        WireMode::Mjpeg => JPEG_CONTENT_TYPE,
        WireMode::Rgb565 => RAW_CONTENT_TYPE,
    };

    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, data.len().to_string()),
        ],
        data,
    )
        .into_response()
}

/// GET /stream — endless stream of frames over one connection
#[utoipa::path(
    get,
    path = "/stream",
    tag = "frames",
    responses(
        (status = 200, description = "multipart/x-mixed-replace MJPEG, or concatenated RGB565 frames")
    )
)]
async fn get_stream(State(state): State<AppState>) -> Response {
    let content_type = match state.mode {
        WireMode::Mjpeg => MJPEG_CONTENT_TYPE,
        WireMode::Rgb565 => RAW_CONTENT_TYPE,
    };

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(stream_frames(state, tx));

    (
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// GET /count — number of cached frames as plain text
#[utoipa::path(
    get,
    path = "/count",
    tag = "system",
    responses(
        (status = 200, description = "Frame count", body = String, content_type = "text/plain")
    )
)]
async fn get_count(State(state): State<AppState>) -> Result<String, (StatusCode, String)> {
    let count = with_frames(&state, |frames| frames.frame_count()).await?;
    Ok(count.to_string())
}

/// GET /status — cache and server details as JSON
#[utoipa::path(
    get,
    path = "/status",
    tag = "system",
    responses(
        (status = 200, description = "Current server status", body = ServerStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Result<Json<ServerStatus>, (StatusCode, String)> {
    let cache = with_frames(&state, |frames| frames.status()).await?;
    Ok(Json(ServerStatus {
        cache,
        mode: state.mode,
        size: state.size,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn get_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404 Not Found")
}

// ── Streaming ────────────────────────────────────────────────────────

/// Why a stream task stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The response body was dropped: client closed the connection
    Disconnected { frames_sent: u64 },
    /// The client stopped reading for longer than the write timeout
    TimedOut { frames_sent: u64 },
    /// The server is shutting down
    Shutdown { frames_sent: u64 },
    /// Fetching a frame failed
    Failed { frames_sent: u64 },
}

/// Feed frames into `tx` until the client goes away.
///
/// Runs as its own task per `/stream` connection. When no frame is available
/// it waits `idle_wait` and asks again instead of ending the stream.
pub async fn stream_frames(
    state: AppState,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
) -> StreamEnd {
    let mut shutdown = state.shutdown.clone();
    let mut frames_sent = 0u64;
    tracing::info!("Stream started ({:?})", state.mode);

    let end = loop {
        if *shutdown.borrow() {
            break StreamEnd::Shutdown { frames_sent };
        }
        if tx.is_closed() {
            break StreamEnd::Disconnected { frames_sent };
        }

        let started = Instant::now();
        let payload = match next_payload(&state).await {
            Ok(p) => p,
            Err((_, e)) => {
                tracing::error!("Stream error: {}", e);
                break StreamEnd::Failed { frames_sent };
            }
        };

        let Some(payload) = payload else {
            let stop = tokio::select! {
                _ = tokio::time::sleep(state.stream.idle_wait) => false,
                _ = shutdown.changed() => true,
            };
            if stop {
                break StreamEnd::Shutdown { frames_sent };
            }
            continue;
        };

        let chunk = match state.mode {
            WireMode::Mjpeg => wire::mjpeg_part(&payload),
            WireMode::Rgb565 => payload,
        };

        let send = tokio::time::timeout(state.stream.write_timeout, tx.send(Ok(chunk)));
        tokio::select! {
            sent = send => match sent {
                Ok(Ok(())) => frames_sent += 1,
                Ok(Err(_)) => break StreamEnd::Disconnected { frames_sent },
                Err(_) => break StreamEnd::TimedOut { frames_sent },
            },
            _ = shutdown.changed() => break StreamEnd::Shutdown { frames_sent },
        }

        if let Some(interval) = state.stream.min_frame_interval {
            let remaining = interval.saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                tokio::time::sleep(remaining).await;
            }
        }
    };

    match end {
        StreamEnd::Disconnected { frames_sent } => {
            tracing::info!("Client disconnected ({} frames sent)", frames_sent)
        }
        StreamEnd::TimedOut { frames_sent } => tracing::warn!(
            "Client stalled for {:?}, closing stream ({} frames sent)",
            state.stream.write_timeout,
            frames_sent
        ),
        StreamEnd::Shutdown { frames_sent } => {
            tracing::info!("Stream closed for shutdown ({} frames sent)", frames_sent)
        }
        StreamEnd::Failed { frames_sent } => {
            tracing::error!("Stream aborted ({} frames sent)", frames_sent)
        }
    }

    end
}

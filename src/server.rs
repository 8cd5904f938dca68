//! # HTTP Surface
//!
//! | Route | Method | Effect |
//! |-------|--------|--------|
//! | `/` | GET | Control page with the live image and Play/Pause buttons |
//! | `/video_feed` | GET | `multipart/x-mixed-replace` JPEG stream |
//! | `/video_feed/play` | GET, POST | Queue a play command, `200 Playback started` |
//! | `/video_feed/pause` | GET, POST | Queue a pause command, `200 Playback paused` |
//! | `/video_feed/status` | GET | JSON snapshot of the session |
//!
//! Control routes never wait for the state change to happen; they answer as
//! soon as the command is queued.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::lifecycle::LifecycleState;
use crate::error::{FeedError, FeedResult};
use crate::processing::multiplexer::StreamMultiplexer;
use crate::session::PipelineController;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Video Feed</title>
</head>
<body>
  <h1>Video Feed</h1>
  <img src="/video_feed" alt="video feed">
  <div>
    <button onclick="fetch('/video_feed/play', {method: 'POST'})">Play</button>
    <button onclick="fetch('/video_feed/pause', {method: 'POST'})">Pause</button>
  </div>
</body>
</html>
"#;

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<PipelineController>,
    pub multiplexer: Arc<StreamMultiplexer>,
}

impl AppState {
    pub fn new(controller: Arc<PipelineController>, multiplexer: Arc<StreamMultiplexer>) -> Self {
        Self {
            controller,
            multiplexer,
        }
    }
}

/// Session snapshot served by `/video_feed/status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub session: Option<u64>,
    pub state: LifecycleState,
    pub frames: u64,
    pub viewers: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/video_feed/play", get(play).post(play))
        .route("/video_feed/pause", get(pause).post(pause))
        .route("/video_feed/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// Open viewer streams are infinite; close the multiplexer as part of
/// `shutdown` or the graceful drain will not finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> FeedResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| FeedError::server("serve", e.to_string()))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn video_feed(State(state): State<AppState>) -> Response {
    let slot = state.controller.frame_slot();
    let stream = state.multiplexer.viewer_stream(slot);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, state.multiplexer.content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn play(State(state): State<AppState>) -> &'static str {
    if let Err(error) = state.controller.play() {
        warn!(%error, "play request not applied");
    }
    "Playback started"
}

async fn pause(State(state): State<AppState>) -> &'static str {
    if let Err(error) = state.controller.pause() {
        warn!(%error, "pause request not applied");
    }
    "Playback paused"
}

async fn status(State(state): State<AppState>) -> axum::Json<StatusReport> {
    let slot = state.controller.frame_slot();
    axum::Json(StatusReport {
        session: state.controller.session_id(),
        state: state.controller.state(),
        frames: slot.sequence(),
        viewers: state.multiplexer.active_viewers(),
    })
}

//! HTTP routes
//!
//! - `GET /stream?url=<upstream>`: live MPEG-TS for the source
//! - `GET /playlist.m3u`: the local playlist file

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::registry::{SourceKey, SourceRegistry};

/// Content type of relayed streams
pub const STREAM_CONTENT_TYPE: &str = "video/mp2t";

/// Content type of the playlist
pub const PLAYLIST_CONTENT_TYPE: &str = "application/x-mpegURL";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SourceRegistry>,
    pub playlist_path: Arc<PathBuf>,
}

/// Query parameters of `/stream`
///
/// Other parameters (such as `format`) are ignored.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    url: Option<String>,
}

/// Build the relay router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/playlist.m3u", get(playlist))
        .with_state(state)
}

async fn stream(State(state): State<AppState>, Query(query): Query<StreamQuery>) -> Response {
    let Some(url) = query.url.filter(|u| !u.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing 'url' parameter").into_response();
    };

    let key = SourceKey::new(url);
    match state.registry.subscribe(&key).await {
        Ok(subscriber) => {
            // Dropping the body on disconnect drops the subscriber, which detaches it.
            let body = Body::from_stream(subscriber.into_stream());
            ([(header::CONTENT_TYPE, STREAM_CONTENT_TYPE)], body).into_response()
        }
        Err(e) => {
            tracing::warn!(source = %key, error = %e, "Stream request failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

async fn playlist(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(state.playlist_path.as_path()).await {
        Ok(data) => ([(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)], data).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "M3U file not found").into_response()
        }
        Err(e) => {
            tracing::error!(
                path = %state.playlist_path.display(),
                error = %e,
                "Failed to read playlist"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read playlist").into_response()
        }
    }
}

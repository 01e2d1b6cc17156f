//! HTTP surface: the peer-to-peer ingest endpoint plus the operator API.
//!
//! Routes:
//!
//! - `POST /upload` — ingest endpoint; peers push files here (multipart,
//!   field `files`), streamed straight to the download directory.
//! - `POST /api/discover` — run a discovery round, return found devices.
//! - `GET /api/peers` — current registry snapshot, no round.
//! - `POST /api/upload` — stage local files for a later send (multipart).
//! - `POST /api/send` — push staged/local files to a chosen peer.
//!
//! The multipart routes stream part bodies to disk chunk by chunk, so the
//! default request body cap is lifted there; memory use is bounded by the
//! chunk size, not the upload size.

pub mod api;
pub mod ingest;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::net::{DiscoveryEngine, TransferClient};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct ApiState {
    /// Discovery engine (and, through it, the peer registry).
    pub engine: Arc<DiscoveryEngine>,
    /// Client used by `/api/send`.
    pub transfers: Arc<TransferClient>,
    /// Where ingested files land.
    pub download_dir: PathBuf,
    /// Where `/api/upload` parks outgoing files.
    pub staging_dir: PathBuf,
}

/// Builds the application router over the given state.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/upload",
            post(ingest::receive_files).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/discover", post(api::discover))
        .route("/api/peers", get(api::peers))
        .route(
            "/api/upload",
            post(api::stage_files).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/send", post(api::send_files))
        .with_state(state)
}

/// Error body shared by all failure responses.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub success: bool,
    pub error: String,
}

/// Renders a failure response with the given status.
pub(crate) fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            error: error.into(),
        }),
    )
        .into_response()
}

//! Operator API: discovery, registry queries, staging and sending.
//!
//! These routes are what a local UI (or curl) drives; the peer-facing
//! ingest route lives in [`super::ingest`].

use std::net::IpAddr;
use std::path::PathBuf;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::ingest::{resolve_destination, store_field};
use super::{error_response, ApiState};
use crate::net::registry::PeerRecord;
use crate::net::transfer::{failure_messages, FILE_FIELD_NAME};

#[derive(Debug, Serialize)]
struct DiscoverResponse {
    success: bool,
    devices: Vec<PeerRecord>,
}

#[derive(Debug, Serialize)]
struct PeersResponse {
    success: bool,
    peers: Vec<PeerRecord>,
}

/// Body of `POST /api/send`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(rename = "targetIP")]
    pub target_ip: IpAddr,
    pub target_port: u16,
    pub file_paths: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SendResponse {
    success: bool,
    errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StagedFile {
    name: String,
    size: u64,
    path: String,
}

#[derive(Debug, Serialize)]
struct StageResponse {
    success: bool,
    files: Vec<StagedFile>,
}

/// `POST /api/discover` — run a discovery round and return what it found.
///
/// A broadcast failure is a 500, distinct from an empty device list.
pub async fn discover(State(state): State<ApiState>) -> Response {
    match state.engine.discover().await {
        Ok(devices) => {
            info!(count = devices.len(), "Discovery round finished");
            Json(DiscoverResponse {
                success: true,
                devices,
            })
            .into_response()
        }
        Err(error) => {
            error!(error = %error, "Discovery round failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("discovery failed: {error}"),
            )
        }
    }
}

/// `GET /api/peers` — registry snapshot without triggering a round.
pub async fn peers(State(state): State<ApiState>) -> Json<impl Serialize> {
    Json(PeersResponse {
        success: true,
        peers: state.engine.peers(),
    })
}

/// `POST /api/upload` — park local files in the staging directory so a
/// later `/api/send` can reference them by path.
pub async fn stage_files(State(state): State<ApiState>, mut multipart: Multipart) -> Response {
    if let Err(error) = tokio::fs::create_dir_all(&state.staging_dir).await {
        error!(error = %error, dir = %state.staging_dir.display(), "Cannot create staging directory");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "staging directory unavailable");
    }

    let mut staged: Vec<StagedFile> = Vec::new();
    let mut attempted = false;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => {
                warn!(error = %error, "Malformed staging upload");
                if staged.is_empty() {
                    return error_response(StatusCode::BAD_REQUEST, "malformed multipart request");
                }
                break;
            }
        };

        if field.name() != Some(FILE_FIELD_NAME) {
            continue;
        }
        let Some(declared) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let Some(dest) = resolve_destination(&state.staging_dir, &declared) else {
            warn!(name = %declared, "Skipping staged part with unusable file name");
            continue;
        };

        attempted = true;
        match store_field(&dest, &mut field).await {
            Ok(size) => {
                let name = dest
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| declared.clone());
                staged.push(StagedFile {
                    name,
                    size,
                    path: dest.display().to_string(),
                });
            }
            Err(error) => {
                warn!(error = %error, "Failed to stage upload part");
            }
        }
    }

    if !attempted {
        return error_response(StatusCode::BAD_REQUEST, "no files uploaded");
    }

    Json(StageResponse {
        success: true,
        files: staged,
    })
    .into_response()
}

/// `POST /api/send` — push the listed files to the target device.
///
/// Partial success is a normal outcome: `success` is false iff any file
/// failed, and `errors` itemizes the failures.
pub async fn send_files(State(state): State<ApiState>, Json(request): Json<SendRequest>) -> Response {
    let results = state
        .transfers
        .send_files(request.target_ip, request.target_port, &request.file_paths)
        .await;
    let errors = failure_messages(&results);
    info!(
        target = %request.target_ip,
        sent = results.len() - errors.len(),
        failed = errors.len(),
        "Send finished"
    );

    Json(SendResponse {
        success: errors.is_empty(),
        errors,
    })
    .into_response()
}

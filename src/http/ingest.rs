//! Ingest endpoint: accepts files pushed by peers.
//!
//! Parts are streamed to the download directory chunk by chunk. A name
//! that is already taken gets a numeric suffix before the extension
//! (`report.pdf` → `report_1.pdf` → `report_2.pdf` …). A part whose write
//! fails is cleaned up and skipped; the remaining parts still go through.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::{error_response, ApiState};
use crate::net::transfer::FILE_FIELD_NAME;

/// Why a single part could not be stored.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload stream failed: {0}")]
    Stream(#[source] MultipartError),
}

/// Response body for a completed ingest request.
#[derive(Debug, Serialize)]
struct IngestResponse {
    success: bool,
    message: String,
    files: Vec<String>,
}

/// `POST /upload` — store each incoming file part in the download
/// directory, reporting the final names of everything stored.
pub async fn receive_files(State(state): State<ApiState>, mut multipart: Multipart) -> Response {
    let mut stored: Vec<String> = Vec::new();
    let mut attempted = false;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => {
                warn!(error = %error, "Malformed multipart upload");
                if stored.is_empty() {
                    return error_response(StatusCode::BAD_REQUEST, "malformed multipart request");
                }
                // The stream broke mid-request; report what already landed.
                break;
            }
        };

        if field.name() != Some(FILE_FIELD_NAME) {
            continue;
        }
        let Some(declared) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let Some(dest) = resolve_destination(&state.download_dir, &declared) else {
            warn!(name = %declared, "Skipping upload part with unusable file name");
            continue;
        };

        attempted = true;
        match store_field(&dest, &mut field).await {
            Ok(written) => {
                info!(file = %dest.display(), bytes = written, "Received file");
                if let Some(final_name) = dest.file_name().and_then(|name| name.to_str()) {
                    stored.push(final_name.to_owned());
                }
            }
            Err(error) => {
                warn!(error = %error, "Failed to store upload part");
            }
        }
    }

    if !attempted {
        return error_response(StatusCode::BAD_REQUEST, "no files in request");
    }

    Json(IngestResponse {
        success: true,
        message: format!("Received {} files", stored.len()),
        files: stored,
    })
    .into_response()
}

/// Picks an unused destination path for a declared file name.
///
/// The declared name is reduced to its base name first, so path components
/// smuggled into it cannot escape the target directory. Returns `None` for
/// names with no usable base (`..`, `/`, empty).
///
/// The existence check and the later file creation are not atomic: two
/// concurrent uploads declaring the same name can race to the same
/// candidate. Accepted for a single-process receiver.
pub(crate) fn resolve_destination(dir: &Path, declared: &str) -> Option<PathBuf> {
    let base = Path::new(declared).file_name()?.to_str()?;

    let candidate = dir.join(base);
    if !candidate.exists() {
        return Some(candidate);
    }

    let stem = Path::new(base)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(base);
    let extension = Path::new(base).extension().and_then(|ext| ext.to_str());

    let mut counter = 1u32;
    loop {
        let name = match extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return Some(candidate);
        }
        counter += 1;
    }
}

/// Streams one multipart field to `dest`. On any failure the partial file
/// is removed before the error is returned.
pub(crate) async fn store_field(dest: &Path, field: &mut Field<'_>) -> Result<u64, StoreError> {
    let mut file = fs::File::create(dest)
        .await
        .map_err(|source| StoreError::Create {
            path: dest.to_path_buf(),
            source,
        })?;

    match write_chunks(&mut file, field, dest).await {
        Ok(written) => Ok(written),
        Err(error) => {
            drop(file);
            let _ = fs::remove_file(dest).await;
            Err(error)
        }
    }
}

async fn write_chunks(
    file: &mut fs::File,
    field: &mut Field<'_>,
    dest: &Path,
) -> Result<u64, StoreError> {
    let mut written = 0u64;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(written),
            Err(source) => return Err(StoreError::Stream(source)),
        };
        file.write_all(&chunk)
            .await
            .map_err(|source| StoreError::Write {
                path: dest.to_path_buf(),
                source,
            })?;
        written += chunk.len() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::IpAddr;
    use std::path::PathBuf;

    use crate::http::testing::spawn_server;
    use crate::net::TransferClient;

    mod destination_resolution {
        use super::*;

        fn touch(path: &Path) {
            std::fs::File::create(path).unwrap();
        }

        #[test]
        fn test_free_name_is_used_as_is() {
            let dir = tempfile::tempdir().unwrap();
            let dest = resolve_destination(dir.path(), "report.pdf").unwrap();
            assert_eq!(dest, dir.path().join("report.pdf"));
        }

        #[test]
        fn test_collision_appends_counter_before_extension() {
            let dir = tempfile::tempdir().unwrap();
            touch(&dir.path().join("report.pdf"));

            let dest = resolve_destination(dir.path(), "report.pdf").unwrap();
            assert_eq!(dest, dir.path().join("report_1.pdf"));

            touch(&dest);
            let dest = resolve_destination(dir.path(), "report.pdf").unwrap();
            assert_eq!(dest, dir.path().join("report_2.pdf"));
        }

        #[test]
        fn test_collision_without_extension() {
            let dir = tempfile::tempdir().unwrap();
            touch(&dir.path().join("notes"));

            let dest = resolve_destination(dir.path(), "notes").unwrap();
            assert_eq!(dest, dir.path().join("notes_1"));
        }

        #[test]
        fn test_declared_path_components_are_dropped() {
            let dir = tempfile::tempdir().unwrap();
            let dest = resolve_destination(dir.path(), "../../etc/evil.txt").unwrap();
            assert_eq!(dest, dir.path().join("evil.txt"));
        }

        #[test]
        fn test_unusable_names_are_rejected() {
            let dir = tempfile::tempdir().unwrap();
            assert!(resolve_destination(dir.path(), "..").is_none());
            assert!(resolve_destination(dir.path(), "/").is_none());
            assert!(resolve_destination(dir.path(), "").is_none());
        }
    }

    mod end_to_end {
        use super::*;

        fn write_file(dir: &Path, name: &str, payload: &[u8]) -> PathBuf {
            let path = dir.join(name);
            std::fs::File::create(&path)
                .unwrap()
                .write_all(payload)
                .unwrap();
            path
        }

        fn patterned_payload(len: usize) -> Vec<u8> {
            (0..len).map(|i| (i % 251) as u8).collect()
        }

        #[tokio::test]
        async fn test_round_trip_preserves_bytes_and_name() {
            let downloads = tempfile::tempdir().unwrap();
            let staging = tempfile::tempdir().unwrap();
            let source = tempfile::tempdir().unwrap();

            let (addr, engine) = spawn_server(
                downloads.path().to_path_buf(),
                staging.path().to_path_buf(),
            )
            .await;

            let payload = patterned_payload(1024 * 1024);
            let path = write_file(source.path(), "data.bin", &payload);

            let client = TransferClient::new().unwrap();
            let results = client
                .send_files(IpAddr::from([127, 0, 0, 1]), addr.port(), &[path])
                .await;
            assert_eq!(results.len(), 1);
            assert!(results[0].is_ok(), "{:?}", results[0].outcome);

            let stored = std::fs::read(downloads.path().join("data.bin")).unwrap();
            assert_eq!(stored, payload);

            engine.shutdown().await;
        }

        #[tokio::test]
        async fn test_resend_with_same_name_gets_suffix() {
            let downloads = tempfile::tempdir().unwrap();
            let staging = tempfile::tempdir().unwrap();
            let source_a = tempfile::tempdir().unwrap();
            let source_b = tempfile::tempdir().unwrap();

            let (addr, engine) = spawn_server(
                downloads.path().to_path_buf(),
                staging.path().to_path_buf(),
            )
            .await;

            let first = patterned_payload(4096);
            let second = vec![0xabu8; 2048];
            let path_a = write_file(source_a.path(), "data.bin", &first);
            let path_b = write_file(source_b.path(), "data.bin", &second);

            let client = TransferClient::new().unwrap();
            let ip = IpAddr::from([127, 0, 0, 1]);
            assert!(client.send_files(ip, addr.port(), &[path_a]).await[0].is_ok());
            assert!(client.send_files(ip, addr.port(), &[path_b]).await[0].is_ok());

            // First file untouched, second stored under a suffixed name.
            assert_eq!(std::fs::read(downloads.path().join("data.bin")).unwrap(), first);
            assert_eq!(
                std::fs::read(downloads.path().join("data_1.bin")).unwrap(),
                second
            );

            engine.shutdown().await;
        }

        #[tokio::test]
        async fn test_request_without_file_parts_is_rejected() {
            let downloads = tempfile::tempdir().unwrap();
            let staging = tempfile::tempdir().unwrap();
            let (addr, engine) = spawn_server(
                downloads.path().to_path_buf(),
                staging.path().to_path_buf(),
            )
            .await;

            let form = reqwest::multipart::Form::new().text("note", "not a file");
            let response = reqwest::Client::new()
                .post(format!("http://{addr}/upload"))
                .multipart(form)
                .send()
                .await
                .unwrap();

            assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!(body["success"], false);

            // Nothing touched the download directory.
            assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);

            engine.shutdown().await;
        }

        #[tokio::test]
        async fn test_response_reports_count_and_final_names() {
            let downloads = tempfile::tempdir().unwrap();
            let staging = tempfile::tempdir().unwrap();
            let (addr, engine) = spawn_server(
                downloads.path().to_path_buf(),
                staging.path().to_path_buf(),
            )
            .await;

            let form = reqwest::multipart::Form::new()
                .part(
                    FILE_FIELD_NAME,
                    reqwest::multipart::Part::bytes(b"alpha".to_vec()).file_name("a.txt"),
                )
                .part(
                    FILE_FIELD_NAME,
                    reqwest::multipart::Part::bytes(b"beta".to_vec()).file_name("b.txt"),
                );
            let response = reqwest::Client::new()
                .post(format!("http://{addr}/upload"))
                .multipart(form)
                .send()
                .await
                .unwrap();

            assert_eq!(response.status(), reqwest::StatusCode::OK);
            let body: serde_json::Value = response.json().await.unwrap();
            assert_eq!(body["success"], true);
            assert_eq!(body["message"], "Received 2 files");
            assert_eq!(body["files"][0], "a.txt");
            assert_eq!(body["files"][1], "b.txt");

            engine.shutdown().await;
        }
    }
}

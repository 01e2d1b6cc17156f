//! File transfer client.
//!
//! Streams local files to a peer's HTTP ingest endpoint as multipart
//! uploads. Files are never buffered whole: each file is opened for
//! streaming and fed into the request body chunk by chunk, so encoding and
//! transmission overlap.
//!
//! Each file in a send call gets its own request and its own result;
//! a failure (unreadable file, unreachable peer, error status) never
//! aborts the remaining files.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Multipart field name carrying file parts, shared with the ingest server.
pub const FILE_FIELD_NAME: &str = "files";

/// Per-request timeout for uploads.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while sending a single file.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The path has no usable base file name (e.g. `/` or `..`).
    #[error("path has no usable file name: {0}")]
    InvalidFileName(PathBuf),

    /// The local file could not be opened for reading.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP request failed (connect error, timeout, broken stream).
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The peer answered with a non-success status.
    #[error("peer rejected upload with status {status}")]
    Status { status: StatusCode },
}

/// Outcome of sending one file. A send call over N paths always yields
/// N of these, in input order.
#[derive(Debug)]
pub struct FileSendResult {
    /// The local path this result refers to.
    pub path: PathBuf,
    /// Success, or why this file failed.
    pub outcome: Result<(), TransferError>,
}

impl FileSendResult {
    /// Returns true if this file was stored by the peer.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The file's base name, falling back to the full path display.
    #[must_use]
    pub fn file_label(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Renders one error string per failed file, for API responses.
#[must_use]
pub fn failure_messages(results: &[FileSendResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(|result| {
            result
                .outcome
                .as_ref()
                .err()
                .map(|error| format!("failed to send {}: {error}", result.file_label()))
        })
        .collect()
}

/// HTTP client for pushing files to peer ingest endpoints.
#[derive(Debug, Clone)]
pub struct TransferClient {
    http: reqwest::Client,
}

impl TransferClient {
    /// Creates a client with the default per-request timeout.
    pub fn new() -> Result<Self, TransferError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Sends each file to the peer's ingest endpoint, sequentially.
    ///
    /// Always returns one result per input path; partial success is a
    /// normal outcome.
    pub async fn send_files(
        &self,
        target_ip: IpAddr,
        target_port: u16,
        paths: &[PathBuf],
    ) -> Vec<FileSendResult> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let outcome = self.send_file(target_ip, target_port, path).await;
            if let Err(error) = &outcome {
                warn!(path = %path.display(), error = %error, "File send failed");
            }
            results.push(FileSendResult {
                path: path.clone(),
                outcome,
            });
        }
        results
    }

    /// Streams a single file to `http://<target>/upload`.
    async fn send_file(
        &self,
        target_ip: IpAddr,
        target_port: u16,
        path: &Path,
    ) -> Result<(), TransferError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| TransferError::InvalidFileName(path.to_path_buf()))?;

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| TransferError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream(body)
            .file_name(file_name.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part(FILE_FIELD_NAME, part);

        // SocketAddr keeps IPv6 literals bracketed in the URL.
        let target = SocketAddr::new(target_ip, target_port);
        let url = format!("http://{target}/upload");
        debug!(%url, file = %file_name, "Uploading file");

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status { status });
        }

        info!(file = %file_name, peer = %target, "File sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Ipv4Addr;

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    /// Binds and immediately drops a TCP listener to get a port with no
    /// listener behind it.
    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    fn short_timeout_client() -> TransferClient {
        TransferClient::with_timeout(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_path_without_file_name_fails() {
        let client = short_timeout_client();
        let results = client
            .send_files(localhost(), unused_port(), &[PathBuf::from("/")])
            .await;

        assert_eq!(results.len(), 1);
        match &results[0].outcome {
            Err(TransferError::InvalidFileName(_)) => {}
            other => panic!("expected InvalidFileName, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_file_yields_open_error() {
        let client = short_timeout_client();
        let results = client
            .send_files(
                localhost(),
                unused_port(),
                &[PathBuf::from("/nonexistent/no-such-file.bin")],
            )
            .await;

        assert_eq!(results.len(), 1);
        match &results[0].outcome {
            Err(TransferError::Open { .. }) => {}
            other => panic!("expected Open error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_peer_fails_per_file_not_globally() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.txt");
        std::fs::File::create(&real)
            .unwrap()
            .write_all(b"payload")
            .unwrap();
        let missing = dir.path().join("missing.txt");

        let client = short_timeout_client();
        let results = client
            .send_files(localhost(), unused_port(), &[real, missing])
            .await;

        // One result per input, each with its own failure mode.
        assert_eq!(results.len(), 2);
        match &results[0].outcome {
            Err(TransferError::Request(_)) => {}
            other => panic!("expected Request error for real file, got {other:?}"),
        }
        match &results[1].outcome {
            Err(TransferError::Open { .. }) => {}
            other => panic!("expected Open error for missing file, got {other:?}"),
        }

        let messages = failure_messages(&results);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("real.txt"));
        assert!(messages[1].contains("missing.txt"));
    }

    #[test]
    fn test_failure_messages_skip_successes() {
        let results = vec![
            FileSendResult {
                path: PathBuf::from("/tmp/ok.txt"),
                outcome: Ok(()),
            },
            FileSendResult {
                path: PathBuf::from("/tmp/bad.txt"),
                outcome: Err(TransferError::InvalidFileName(PathBuf::from("/tmp/bad.txt"))),
            },
        ];

        let messages = failure_messages(&results);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("bad.txt"));
    }
}

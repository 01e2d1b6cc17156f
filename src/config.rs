//! Static configuration: ports, device name, directories.
//!
//! Defaults follow the platform conventions: the device name is the
//! hostname, downloads land in `~/Downloads/LanShare`, and staged
//! outgoing files go under the OS temp directory. All of it can be
//! overridden from the CLI.

use std::path::PathBuf;

use tracing::warn;

/// Default port for the HTTP server (ingest + operator API).
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default UDP port for peer discovery.
pub const DEFAULT_DISCOVERY_PORT: u16 = 8888;

/// Subdirectory of the platform download folder that incoming files land in.
const DOWNLOAD_SUBDIR: &str = "LanShare";

/// Staging directory name under the OS temp dir.
const STAGING_SUBDIR: &str = "lanshare-staging";

/// Last-resort download directory, relative to the working directory.
const FALLBACK_DOWNLOAD_DIR: &str = "downloads";

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds.
    pub http_port: u16,
    /// Port the discovery engine binds.
    pub discovery_port: u16,
    /// Display name advertised to peers.
    pub device_name: String,
    /// Directory incoming files are stored in (created on startup).
    pub download_dir: PathBuf,
}

impl Config {
    /// Resolves a configuration, filling unset values with defaults and
    /// making sure the download directory exists.
    #[must_use]
    pub fn new(
        http_port: u16,
        discovery_port: u16,
        device_name: Option<String>,
        download_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            http_port,
            discovery_port,
            device_name: device_name.unwrap_or_else(default_device_name),
            download_dir: prepare_download_dir(download_dir.unwrap_or_else(default_download_dir)),
        }
    }

    /// Where `/api/upload` parks outgoing files.
    #[must_use]
    pub fn staging_dir() -> PathBuf {
        std::env::temp_dir().join(STAGING_SUBDIR)
    }
}

/// The hostname, or a platform-tagged placeholder if it cannot be read.
#[must_use]
pub fn default_device_name() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| format!("unknown-{}", std::env::consts::OS))
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DOWNLOAD_SUBDIR)
}

/// Creates the requested download directory, falling back to a local
/// `downloads/` directory if that fails.
fn prepare_download_dir(requested: PathBuf) -> PathBuf {
    match std::fs::create_dir_all(&requested) {
        Ok(()) => requested,
        Err(error) => {
            warn!(
                error = %error,
                dir = %requested.display(),
                "Cannot create download directory, falling back to ./downloads"
            );
            let fallback = PathBuf::from(FALLBACK_DOWNLOAD_DIR);
            if let Err(error) = std::fs::create_dir_all(&fallback) {
                warn!(error = %error, "Cannot create fallback download directory");
            }
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_name_is_not_empty() {
        assert!(!default_device_name().is_empty());
    }

    #[test]
    fn test_download_dir_is_created() {
        let base = tempfile::tempdir().unwrap();
        let requested = base.path().join("nested").join("LanShare");

        let config = Config::new(8080, 8888, Some("dev".into()), Some(requested.clone()));

        assert_eq!(config.download_dir, requested);
        assert!(requested.is_dir());
        assert_eq!(config.device_name, "dev");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.discovery_port, 8888);
    }

    #[test]
    fn test_staging_dir_lives_under_temp() {
        assert!(Config::staging_dir().starts_with(std::env::temp_dir()));
    }
}

//! lanshare - share files with devices on your local network.
//!
//! No central server, no pairing: devices find each other with a UDP
//! broadcast handshake and push files over plain HTTP.
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - [`config`]: ports, device name, and directory resolution
//! - [`net`]: the peer-to-peer core — discovery protocol engine, peer
//!   registry, and the streaming transfer client
//! - [`http`]: the axum server exposing the ingest endpoint and the
//!   operator API
//!
//! # Discovery
//!
//! An operator-triggered discovery round broadcasts a `discover` message
//! on the UDP discovery port; every listening device answers with a
//! `response` naming itself and its HTTP ingest port. Responses are
//! collected into a per-engine peer registry, keyed by the address each
//! response actually arrived from.
//!
//! # Example
//!
//! ```rust,ignore
//! use lanshare::net::{DiscoveryConfig, DiscoveryEngine, TransferClient};
//!
//! let engine = DiscoveryEngine::start(DiscoveryConfig::new(8888, 8080, "laptop")).await?;
//! let devices = engine.discover().await?;
//!
//! let client = TransferClient::new()?;
//! let results = client.send_files(devices[0].ip, devices[0].port, &paths).await;
//! ```

pub mod config;
pub mod http;
pub mod net;

pub use config::Config;
pub use net::{DiscoveryConfig, DiscoveryEngine, DiscoveryError, PeerRecord, TransferClient};

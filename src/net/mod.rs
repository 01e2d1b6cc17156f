//! Networking module for lanshare
//!
//! This module provides the peer-to-peer core:
//!
//! - **Registry**: concurrency-safe store of peers observed on the network
//! - **Discovery**: UDP broadcast request/response protocol engine
//! - **Transfer**: streaming multipart HTTP client for pushing files
//!
//! # Architecture
//!
//! The discovery engine owns a UDP socket and its peer registry; an
//! operator-triggered discovery round broadcasts a `discover` message and
//! collects `response` messages for a bounded window. Sending files is a
//! separate HTTP path: the transfer client streams each file to the chosen
//! peer's ingest endpoint (served by [`crate::http`] on the peer).

pub mod discovery;
pub mod registry;
pub mod transfer;

pub use discovery::{DiscoveryConfig, DiscoveryEngine, DiscoveryError, DiscoveryMessage, MessageKind};
pub use registry::{PeerRecord, PeerRegistry};
pub use transfer::{FileSendResult, TransferClient, TransferError};

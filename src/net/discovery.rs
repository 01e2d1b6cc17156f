//! Local network discovery over UDP broadcast.
//!
//! Each device binds a UDP socket on the discovery port and runs a receive
//! loop. Discovery is a two-message protocol:
//!
//! - `discover` — broadcast to the subnet; every listening device replies.
//! - `response` — unicast back to the sender; never itself answered, so the
//!   protocol cannot loop.
//!
//! Replies and registry entries use the *socket-observed* sender address,
//! not the address claimed inside the payload. A spoofed `senderAddress`
//! therefore cannot redirect replies or plant registry entries for an
//! address the sender does not control.
//!
//! A discovery round is an explicit, bounded operation: clear the registry,
//! broadcast one `discover`, wait out the collection window (or shutdown,
//! whichever comes first), return whatever accumulated.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use local_ip_address::local_ip;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::{PeerRecord, PeerRegistry};

/// How long a discovery round collects responses before returning.
pub const DEFAULT_COLLECTION_WINDOW: Duration = Duration::from_secs(3);

/// Pause after a failed socket read, so a persistent error cannot spin the
/// receive loop hot.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Errors that can occur while running the discovery engine.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery port could not be bound or configured. Fatal for this
    /// engine instance; there is no fallback port.
    #[error("failed to bind discovery port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Sending the discovery broadcast failed (e.g. no network). Reported
    /// so callers can tell "network error" from "no peers answered".
    #[error("failed to send discovery broadcast: {0}")]
    Broadcast(#[source] std::io::Error),

    /// A wire message could not be encoded.
    #[error("failed to encode discovery message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The engine has been shut down.
    #[error("discovery engine is stopped")]
    Stopped,
}

/// The two discovery message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Discover,
    Response,
}

/// Wire payload exchanged over UDP, JSON-encoded.
///
/// `sender_address` and `sender_port` are self-reported. Receivers only
/// trust `sender_port` (from `response` messages); the address is always
/// corroborated from the transport layer instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMessage {
    pub kind: MessageKind,
    pub sender_name: String,
    pub sender_address: String,
    pub sender_port: u16,
}

/// Configuration for a [`DiscoveryEngine`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// UDP port to bind for discovery traffic.
    pub discovery_port: u16,
    /// HTTP ingest port advertised in our responses.
    pub http_port: u16,
    /// Display name advertised in our messages.
    pub device_name: String,
    /// Where discovery rounds send the `discover` message. Defaults to the
    /// limited-broadcast address on the bound discovery port.
    pub broadcast_target: Option<SocketAddr>,
    /// How long a round waits for responses.
    pub collection_window: Duration,
}

impl DiscoveryConfig {
    /// Creates a config with the default broadcast target and window.
    #[must_use]
    pub fn new(discovery_port: u16, http_port: u16, device_name: impl Into<String>) -> Self {
        Self {
            discovery_port,
            http_port,
            device_name: device_name.into(),
            broadcast_target: None,
            collection_window: DEFAULT_COLLECTION_WINDOW,
        }
    }

    /// Overrides the broadcast target (tests point this at a loopback peer).
    #[must_use]
    pub fn with_broadcast_target(mut self, target: SocketAddr) -> Self {
        self.broadcast_target = Some(target);
        self
    }

    /// Overrides the collection window (tests shorten it).
    #[must_use]
    pub fn with_collection_window(mut self, window: Duration) -> Self {
        self.collection_window = window;
        self
    }
}

/// What this device says about itself on the wire.
#[derive(Debug, Clone)]
struct Identity {
    name: String,
    advertised_address: String,
    http_port: u16,
}

impl Identity {
    fn message(&self, kind: MessageKind) -> DiscoveryMessage {
        DiscoveryMessage {
            kind,
            sender_name: self.name.clone(),
            sender_address: self.advertised_address.clone(),
            sender_port: self.http_port,
        }
    }
}

/// Discovery protocol engine: owns the UDP socket, runs the receive loop,
/// and drives the [`PeerRegistry`].
pub struct DiscoveryEngine {
    socket: Arc<UdpSocket>,
    registry: Arc<PeerRegistry>,
    identity: Identity,
    broadcast_target: SocketAddr,
    collection_window: Duration,
    cancel: CancellationToken,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryEngine {
    /// Binds the discovery port and spawns the receive loop.
    ///
    /// Binding failure is fatal for this engine instance: the error is
    /// returned and no socket is left open.
    pub async fn start(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let port = config.discovery_port;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|source| DiscoveryError::Bind { port, source })?;
        socket
            .set_broadcast(true)
            .map_err(|source| DiscoveryError::Bind { port, source })?;
        let bound_port = socket
            .local_addr()
            .map_err(|source| DiscoveryError::Bind { port, source })?
            .port();

        let advertised_address = local_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|_| Ipv4Addr::LOCALHOST.to_string());
        let identity = Identity {
            name: config.device_name,
            advertised_address,
            http_port: config.http_port,
        };

        let broadcast_target = config
            .broadcast_target
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::BROADCAST, bound_port)));

        let socket = Arc::new(socket);
        let registry = Arc::new(PeerRegistry::new());
        let cancel = CancellationToken::new();

        let recv_task = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            Arc::clone(&registry),
            identity.clone(),
            cancel.clone(),
        ));

        info!(port = bound_port, name = %identity.name, "Discovery engine started");

        Ok(Self {
            socket,
            registry,
            identity,
            broadcast_target,
            collection_window: config.collection_window,
            cancel,
            recv_task: Mutex::new(Some(recv_task)),
        })
    }

    /// Runs one discovery round: clears the registry, broadcasts a
    /// `discover`, waits out the collection window, and returns a snapshot
    /// of the responses that arrived.
    ///
    /// Returns early with whatever accumulated if the engine is shut down
    /// mid-round. A failed broadcast is returned as an error rather than an
    /// empty peer list.
    pub async fn discover(&self) -> Result<Vec<PeerRecord>, DiscoveryError> {
        if self.cancel.is_cancelled() {
            return Err(DiscoveryError::Stopped);
        }

        self.registry.clear();

        let data = serde_json::to_vec(&self.identity.message(MessageKind::Discover))?;
        self.socket
            .send_to(&data, self.broadcast_target)
            .await
            .map_err(DiscoveryError::Broadcast)?;
        debug!(target = %self.broadcast_target, "Discovery broadcast sent");

        tokio::select! {
            () = self.cancel.cancelled() => {
                debug!("Discovery round cut short by shutdown");
            }
            () = tokio::time::sleep(self.collection_window) => {}
        }

        Ok(self.registry.snapshot())
    }

    /// Returns the current registry snapshot without running a round.
    #[must_use]
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.registry.snapshot()
    }

    /// Returns a handle to the engine's peer registry.
    #[must_use]
    pub fn registry(&self) -> Arc<PeerRegistry> {
        Arc::clone(&self.registry)
    }

    /// The address the discovery socket is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Stops the receive loop and waits for it to exit. In-flight discovery
    /// rounds observe the stop and return early.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.recv_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        debug!("Discovery engine stopped");
    }
}

impl Drop for DiscoveryEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Receives datagrams until cancelled. Malformed payloads are discarded;
/// read errors back off briefly and the loop continues.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    registry: Arc<PeerRegistry>,
    identity: Identity,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; 2048];

    loop {
        let (len, addr) = tokio::select! {
            () = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(error) => {
                    warn!(error = %error, "UDP receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        let message: DiscoveryMessage = match serde_json::from_slice(&buf[..len]) {
            Ok(message) => message,
            Err(error) => {
                debug!(error = %error, from = %addr, "Discarding malformed discovery datagram");
                continue;
            }
        };

        match message.kind {
            MessageKind::Discover => {
                // Reply to the observed source address only; the payload's
                // senderAddress is untrusted and ignored.
                match serde_json::to_vec(&identity.message(MessageKind::Response)) {
                    Ok(reply) => {
                        if let Err(error) = socket.send_to(&reply, addr).await {
                            warn!(error = %error, to = %addr, "Failed to send discovery response");
                        } else {
                            debug!(to = %addr, "Answered discovery request");
                        }
                    }
                    Err(error) => warn!(error = %error, "Failed to encode discovery response"),
                }
            }
            MessageKind::Response => {
                let record = PeerRecord {
                    name: message.sender_name,
                    ip: addr.ip(),
                    port: message.sender_port,
                };
                info!(name = %record.name, ip = %record.ip, port = record.port, "Discovered device");
                registry.upsert(addr.ip(), record);
            }
        }
    }

    debug!("Discovery receive loop exited");
}

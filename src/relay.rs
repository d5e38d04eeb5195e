use std::error::Error;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use uuid::Uuid;
use crate::client::IoCore;
use crate::config::{BinaryType, Credentials, RelayConfig};
use crate::message::{Payload, RelayEvent, SocketEvent};
use crate::ogg::HeaderCache;
use crate::{tau_debug, tau_error, tau_info, tau_warn};

/// Largest datagram accepted on the ingest socket.
pub const MTU: usize = 1500;
/// Pages buffered per HTTP mount subscriber before it starts lagging.
pub const PAGE_BACKLOG: usize = 1024;

/// Error types that can occur during relay operations
#[derive(Debug)]
pub enum RelayError {
    /// Binding the WebSocket or ingest socket failed
    Bind(String, io::Error),

    /// Every connected listener failed to receive the page
    BroadcastFailed(usize),

    /// Indicates that the specified listener was not found
    PeerNotFound(Uuid),

    /// Indicates that sending a page to a listener failed
    SendFailed(Uuid),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Bind(addr, e) => {
                write!(f, "Failed to bind {}: {}", addr, e)
            },
            RelayError::BroadcastFailed(count) => {
                write!(f, "Failed to deliver page to {} listeners", count)
            },
            RelayError::PeerNotFound(peer_id) => {
                write!(f, "Listener with ID {} not found", peer_id)
            },
            RelayError::SendFailed(peer_id) => {
                write!(f, "Failed to send page to listener {}", peer_id)
            }
        }
    }
}

impl Error for RelayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RelayError::Bind(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Fans Ogg pages out to every connected WebSocket listener.
pub struct PageRelay {
    cfg: RelayConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    peers: DashMap<Uuid, Arc<IoCore>>,
    headers: Mutex<HeaderCache>,
    pages: broadcast::Sender<Bytes>,
}

impl PageRelay {
    pub async fn bind(cfg: RelayConfig) -> Result<Self, RelayError> {
        let addr = cfg.address().to_string();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayError::Bind(addr.clone(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::Bind(addr, e))?;

        Ok(Self {
            cfg,
            listener,
            local_addr,
            peers: DashMap::new(),
            headers: Mutex::new(HeaderCache::new()),
            pages: broadcast::channel(PAGE_BACKLOG).0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.cfg
    }

    /// Frozen Opus header pages, once the stream reached its first audio page.
    pub fn cached_headers(&self) -> Option<Bytes> {
        self.headers.lock().unwrap_or_else(|e| e.into_inner()).headers()
    }

    /// Audio pages published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.pages.subscribe()
    }

    fn remove_peer(&self, peer_id: Uuid) {
        tau_debug!("Removing listener {}", peer_id);

        self.peers.remove(&peer_id);
    }

    pub async fn run(self: Arc<Self>, tx: Sender<RelayEvent>) {
        tau_info!("Relay accepting listeners on {}", self.local_addr);

        loop {
            match self.listener.accept().await {
                Ok((socket, addr)) => {
                    tau_debug!("Accepted connection from {}", addr);

                    if let Err(e) = socket.set_nodelay(self.cfg.no_delay()) {
                        tau_warn!("Failed to set TCP_NODELAY: {:?}", e);
                    }

                    let relay = Arc::clone(&self);
                    let app_tx = tx.clone();
                    tokio::spawn(async move {
                        relay.handshake(socket, addr, app_tx).await;
                    });
                }
                Err(e) => {
                    tau_error!("Error accepting connection: {:?}", e);
                }
            }
        }
    }

    async fn handshake(self: Arc<Self>, socket: TcpStream, addr: SocketAddr, app_tx: Sender<RelayEvent>) {
        let credentials = self.cfg.credentials().cloned();
        let check = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            match &credentials {
                Some(creds) if !Self::authorized(creds, req) => {
                    let mut refusal = ErrorResponse::new(Some("invalid credentials".into()));
                    *refusal.status_mut() = StatusCode::UNAUTHORIZED;
                    Err(refusal)
                }
                _ => Ok(resp),
            }
        };

        let ws = match tokio_tungstenite::accept_hdr_async(socket, check).await {
            Ok(ws) => ws,
            Err(e) => {
                tau_warn!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
        };

        let (peer_tx, peer_rx) = mpsc::channel::<SocketEvent>(100);
        let peer = Arc::new(IoCore::new(ws, Some(peer_tx), BinaryType::Raw));
        let peer_id = peer.id;

        // Prime late joiners before they see any audio page.
        if let Some(headers) = self.cached_headers() {
            if let Err(e) = peer.send(Payload::Binary(headers)).await {
                tau_warn!("Failed to replay headers to {}: {}", peer_id, e);
                return;
            }
        }

        self.peers.insert(peer_id, Arc::clone(&peer));
        if app_tx.send(RelayEvent::Joined { peer_id }).await.is_err() {
            tau_error!("Failed to announce listener {}", peer_id);
        }

        self.peer_task(peer_id, peer_rx, app_tx).await;
    }

    fn authorized(creds: &Credentials, req: &Request) -> bool {
        let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());
        creds.validate(
            header(Credentials::USERNAME_HEADER),
            header(Credentials::PASSWORD_HEADER),
            header(Credentials::PORT_HEADER).and_then(|p| p.parse().ok()),
        )
    }

    async fn peer_task(&self, peer_id: Uuid, mut peer_rx: Receiver<SocketEvent>, app_tx: Sender<RelayEvent>) {
        tau_info!("Handling listener {}", peer_id);

        while let Some(event) = peer_rx.recv().await {
            let relay_event = match event {
                SocketEvent::Message(payload) => {
                    tau_warn!("Listener {} sent {} bytes upstream", peer_id, payload.len());
                    RelayEvent::Inbound { peer_id, len: payload.len() }
                }
                SocketEvent::Closed { reason: Some(error) } => {
                    RelayEvent::Error { peer_id, error }
                }
                SocketEvent::Closed { reason: None } => break,
                SocketEvent::Open | SocketEvent::Connection => continue,
            };

            let stop = matches!(relay_event, RelayEvent::Error { .. });
            if app_tx.send(relay_event).await.is_err() {
                tau_error!("Failed to forward event from listener {}", peer_id);
                break;
            }
            if stop {
                break;
            }
        }

        tau_debug!("Listener {} disconnected", peer_id);
        self.remove_peer(peer_id);
        let _ = app_tx.send(RelayEvent::Left { peer_id }).await;
    }

    pub async fn send_to_peer(&self, peer_id: &Uuid, page: Bytes) -> Result<(), RelayError> {
        let Some(peer) = self.peers.get(peer_id).map(|p| Arc::clone(p.value())) else {
            tau_error!("Failed to find listener {}", peer_id);
            return Err(RelayError::PeerNotFound(*peer_id));
        };

        peer.send(Payload::Binary(page)).await.map_err(|e| {
            tau_error!("Failed to send page to listener {}: {}", peer_id, e);
            RelayError::SendFailed(*peer_id)
        })
    }

    /// Sends a close frame to one listener.
    pub async fn close_peer(&self, peer_id: &Uuid) -> Result<(), RelayError> {
        let Some(peer) = self.peers.get(peer_id).map(|p| Arc::clone(p.value())) else {
            return Err(RelayError::PeerNotFound(*peer_id));
        };
        peer.close().await.map_err(|_| RelayError::SendFailed(*peer_id))
    }

    /// Publishes one Ogg page. Header pages are cached for late joiners;
    /// anything else goes to every listener. Returns how many received it.
    pub async fn publish(&self, page: Bytes) -> Result<usize, RelayError> {
        let is_header = self.headers.lock().unwrap_or_else(|e| e.into_inner()).offer(&page);
        if is_header {
            tau_debug!("Cached header page ({} bytes)", page.len());
            return Ok(0);
        }

        // No HTTP subscriber is not an error.
        let _ = self.pages.send(page.clone());

        let peers: Vec<_> = self
            .peers
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        if peers.is_empty() {
            return Ok(0);
        }

        let tasks = peers.into_iter().map(|(id, peer)| {
            let page = page.clone();
            async move {
                match peer.send(Payload::Binary(page)).await {
                    Ok(()) => Ok(id),
                    Err(e) => {
                        tau_warn!("Publish FAIL → {id}: {e}");
                        Err(id)
                    }
                }
            }
        });

        let mut delivered = 0;
        let mut failed = 0;
        for res in join_all(tasks).await {
            match res {
                Ok(_) => delivered += 1,
                Err(id) => {
                    self.remove_peer(id);
                    failed += 1;
                }
            }
        }

        if delivered == 0 && failed > 0 {
            return Err(RelayError::BroadcastFailed(failed));
        }
        Ok(delivered)
    }

    /// Publishes every datagram received on `addr`.
    pub async fn ingest_udp(self: Arc<Self>, addr: &str) -> Result<(), RelayError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| RelayError::Bind(addr.to_string(), e))?;
        tau_info!("Ingesting Ogg pages on udp://{}", addr);

        let mut buf = [0u8; MTU];
        let mut reachable = true;
        loop {
            let size = match socket.recv(&mut buf).await {
                Ok(size) => size,
                Err(e) => {
                    tau_warn!("UDP receive error: {}", e);
                    continue;
                }
            };

            match self.publish(Bytes::copy_from_slice(&buf[..size])).await {
                Ok(_) => reachable = true,
                Err(e) => {
                    // Log once per outage, not per page.
                    if reachable {
                        reachable = false;
                        tau_warn!("Could not reach listeners: {}", e);
                    }
                }
            }
        }
    }
}

use bytes::Bytes;
use std::fmt;
use uuid::Uuid;

/// Data carried by a single WebSocket frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Binary(Bytes),
    Text(String),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Binary(b) => b.len(),
            Payload::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Binary(b) => b,
            Payload::Text(t) => t.as_bytes(),
        }
    }
}

impl From<&'static str> for Payload {
    fn from(s: &'static str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Binary(b)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(t) => write!(f, "{t}"),
            Payload::Binary(b) => write!(f, "ArrayBuffer({} bytes) {:02x?}", b.len(), &b[..b.len().min(16)]),
        }
    }
}

/// Events delivered by a socket to the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(Payload),
    /// Server-side "new connection" event. A client transport never emits it.
    Connection,
    Closed { reason: Option<String> },
}

impl SocketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SocketEvent::Open => "open",
            SocketEvent::Message(_) => "message",
            SocketEvent::Connection => "connection",
            SocketEvent::Closed { .. } => "close",
        }
    }
}

#[derive(Debug)]
pub enum RelayEvent {
    Joined { peer_id: Uuid },
    Left { peer_id: Uuid },
    /// A listener sent a frame upstream. Listeners are not expected to.
    Inbound { peer_id: Uuid, len: usize },
    Error { peer_id: Uuid, error: String },
}

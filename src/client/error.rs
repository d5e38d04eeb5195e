//! src/client/error.rs

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Collective error type for everything that can go wrong on the client side.
#[derive(Debug, Error)]
pub enum ClientError {
    /* ───────────── Transport / Socket ───────────── */
    #[error("Connection to '{url}' failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("Timeout writing to socket")]
    WriteTimeout,

    #[error("Invalid value for header '{0}'")]
    InvalidHeader(&'static str),

    #[error("HTTP {status}: WebSocket upgrade rejected")]
    UpgradeRejected { status: u16 },

    /* ───────────── Protocol ───────────── */
    #[error("WebSocket error: {0}")]
    Protocol(#[from] tungstenite::Error),

    /* ───────────── Channel / Task ───────────── */
    #[error("MPSC channel to write task is closed")]
    ChannelClosed,
}

impl ClientError {
    pub(crate) fn connect(url: &str, source: tungstenite::Error) -> Self {
        match source {
            tungstenite::Error::Http(resp) => ClientError::UpgradeRejected {
                status: resp.status().as_u16(),
            },
            other => ClientError::Connect { url: url.to_string(), source: other },
        }
    }

    /// Returns the HTTP status code if the server refused the upgrade.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::UpgradeRejected { status } => Some(*status),
            _ => None,
        }
    }
}

use super::*;
use crate::config::{Credentials, ListenerConfig};
use crate::message::{Payload, SocketEvent};
use crate::{tau_debug, tau_info};
use tokio::sync::mpsc::{self, Receiver};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use uuid::Uuid;

const EVENT_QUEUE: usize = 100;

/// WebSocket client side of a listener.
///
/// `connect` hands back the client together with the receiver of its
/// [`SocketEvent`]s. The first event is always [`SocketEvent::Open`] and the
/// last one is [`SocketEvent::Closed`].
pub struct SocketClient {
    core: IoCore,
    url:  String,
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("id", &self.core.id)
            .field("url", &self.url)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl SocketClient {
    pub async fn connect(cfg: &ListenerConfig) -> Result<(Self, Receiver<SocketEvent>), ClientError> {
        let url = cfg.address();
        tau_info!("Connecting to {}", url);

        let request = Self::upgrade_request(cfg)?;
        let (ws, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ClientError::connect(url, e))?;
        tau_debug!("WebSocket connected to {} (HTTP {})", url, response.status());

        let (app_tx, app_rx) = mpsc::channel::<SocketEvent>(EVENT_QUEUE);
        // Fresh channel, cannot be full or closed yet.
        app_tx
            .send(SocketEvent::Open)
            .await
            .map_err(|_| ClientError::ChannelClosed)?;

        let core = IoCore::new(ws, Some(app_tx), cfg.binary_type());
        Ok((Self { core, url: url.to_string() }, app_rx))
    }

    /// Upgrade request carrying the credential headers, if any.
    fn upgrade_request(cfg: &ListenerConfig) -> Result<Request, ClientError> {
        let url = cfg.address();
        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::connect(url, e))?;

        if let Some(creds) = cfg.credentials() {
            let headers = request.headers_mut();
            let port = creds.broadcast_port.to_string();
            for (name, value) in [
                (Credentials::USERNAME_HEADER, creds.username.as_str()),
                (Credentials::PASSWORD_HEADER, creds.password.as_str()),
                (Credentials::PORT_HEADER, port.as_str()),
            ] {
                let value = HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name))?;
                headers.insert(name, value);
            }
        }
        Ok(request)
    }

    #[inline] pub fn id(&self) -> Uuid         { self.core.id }
    #[inline] pub fn url(&self) -> &str        { &self.url }
    #[inline] pub fn is_alive(&self) -> bool   { self.core.is_alive() }

    pub async fn send(&self, payload: Payload) -> Result<(), ClientError> {
        tau_debug!("Sending {} bytes to {}", payload.len(), self.url);
        self.core.send(payload).await
    }

    pub async fn close(&self) -> Result<(), ClientError> {
        tau_debug!("Closing connection to {}", self.url);
        self.core.close().await
    }
}

use crate::client::error::ClientError;
use crate::config::BinaryType;
use crate::message::{Payload, SocketEvent};
use crate::{tau_debug, tau_error, tau_warn};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_QUEUE: usize = 100;

/// One WebSocket connection split into a read loop and a write loop.
///
/// Shared by the listener client and the relay's per-peer connections.
pub(crate) struct IoCore {
    pub id: Uuid,
    write_tx: Sender<Message>,
    read_jh:  tokio::task::JoinHandle<()>,
    write_jh: tokio::task::JoinHandle<()>,
}

impl IoCore {
    pub fn new<S>(
        ws: WebSocketStream<S>,
        to_app: Option<Sender<SocketEvent>>,
        binary_type: BinaryType,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (writer, reader) = ws.split();
        let (write_tx, write_rx) = mpsc::channel::<Message>(WRITE_QUEUE);

        // ---------------- Write-Loop -----------------------------------
        let write_jh = tokio::spawn(async move {
            if let Err(e) = Self::write_task(writer, write_rx).await {
                tau_warn!("Write task error for connection {}: {}", id, e);
            }
        });

        // ---------------- Reader-Loop -----------------------------------
        let read_jh = if let Some(app) = to_app {
            tokio::spawn(async move {
                if let Err(e) = Self::read_task(reader, app, id, binary_type).await {
                    tau_warn!("Read task error for connection {}: {}", id, e);
                }
            })
        } else {
            tokio::spawn(async {})
        };

        Self { id, write_tx, read_jh, write_jh }
    }

    pub async fn send(&self, payload: Payload) -> Result<(), ClientError> {
        let msg = match payload {
            Payload::Binary(b) => Message::Binary(b.to_vec()),
            Payload::Text(t) => Message::Text(t),
        };
        self.write_tx
            .send(msg)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    pub async fn close(&self) -> Result<(), ClientError> {
        self.write_tx
            .send(Message::Close(None))
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    pub fn is_alive(&self) -> bool {
        !self.write_jh.is_finished() && !self.read_jh.is_finished()
    }

    /* ----------------------------------------------------------------
       PRIVATE Loops
    ---------------------------------------------------------------- */
    async fn read_task<S>(
        mut reader: SplitStream<WebSocketStream<S>>,
        to_app_tx: Sender<SocketEvent>,
        id: Uuid,
        binary_type: BinaryType,
    ) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tau_debug!("Read task started for connection {}", id);

        loop {
            let event = match reader.next().await {
                Some(Ok(Message::Binary(data))) => {
                    tau_debug!("Connection {} received binary frame ({} bytes)", id, data.len());
                    let payload = match binary_type {
                        BinaryType::Raw => Payload::Binary(data.into()),
                        BinaryType::Utf8 => Payload::Text(String::from_utf8_lossy(&data).into_owned()),
                    };
                    SocketEvent::Message(payload)
                }
                Some(Ok(Message::Text(text))) => {
                    tau_debug!("Connection {} received text frame ({} bytes)", id, text.len());
                    SocketEvent::Message(Payload::Text(text))
                }
                Some(Ok(Message::Close(frame))) => {
                    tau_debug!("Connection {} received close frame", id);
                    let reason = frame
                        .map(|f| f.reason.into_owned())
                        .filter(|r| !r.is_empty());
                    let _ = to_app_tx.send(SocketEvent::Closed { reason }).await;
                    return Ok(());
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    tau_error!("Read error on connection {}: {}", id, e);
                    let _ = to_app_tx
                        .send(SocketEvent::Closed { reason: Some(e.to_string()) })
                        .await;
                    return Err(ClientError::Protocol(e));
                }
                None => {
                    tau_debug!("Connection closed by peer for connection {}", id);
                    let _ = to_app_tx.send(SocketEvent::Closed { reason: None }).await;
                    return Ok(());
                }
            };

            if to_app_tx.send(event).await.is_err() {
                tau_error!("Failed to forward event for connection {}", id);
                return Err(ClientError::ChannelClosed);
            }
        }
    }

    async fn write_task<S>(
        mut writer: SplitSink<WebSocketStream<S>, Message>,
        mut rx: Receiver<Message>,
    ) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tau_debug!("Write task waiting for messages");

        while let Some(msg) = rx.recv().await {
            let closing = msg.is_close();
            match tokio::time::timeout(WRITE_TIMEOUT, writer.send(msg)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tau_error!("Error writing frame: {}", e);
                    return Err(ClientError::Protocol(e));
                }
                Err(_) => {
                    tau_error!("Timeout writing frame");
                    return Err(ClientError::WriteTimeout);
                }
            }
            if closing {
                break;
            }
        }

        tau_debug!("Write channel closed, shutting down write task");
        Ok(())
    }
}

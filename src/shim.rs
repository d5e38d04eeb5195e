//! Event wiring for a single listener: decoder bootstrap, startup sequence,
//! socket connection and per-event handlers.

use crate::client::{ClientError, SocketClient};
use crate::config::{BinaryType, DecoderConfig, ListenerConfig};
use crate::console::{Console, LogLine};
use crate::decoder::{DecoderError, DecoderFactory, DecoderHandle};
use crate::message::{Payload, SocketEvent};
use crate::{ogg, tau_debug, tau_error, tau_info};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::Receiver;

pub const SEQUENCE_LEN: u32 = 100;

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),

    #[error("Socket error: {0}")]
    Client(#[from] ClientError),

    #[error("Event '{0}' is never emitted by a client transport")]
    UnexpectedEvent(&'static str),
}

/// What happens when a handler fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The failure is not recovered; it ends the run and reaches the caller.
    #[default]
    Fatal,
}

impl ErrorPolicy {
    fn apply<T>(self, event: &'static str, res: Result<T, ShimError>) -> Result<T, ShimError> {
        match (self, res) {
            (_, Ok(v)) => Ok(v),
            (ErrorPolicy::Fatal, Err(e)) => {
                tau_error!("Unhandled error in '{}' handler: {}", event, e);
                Err(e)
            }
        }
    }
}

/// Inbound message counter. Starts at zero, never resets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageCounter {
    value: u64,
}

impl MessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current value, then increments.
    pub fn observe(&mut self) -> u64 {
        let seen = self.value;
        self.value += 1;
        seen
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct EventShim {
    console: Arc<dyn Console>,
    counter: MessageCounter,
    policy:  ErrorPolicy,
    decoder: Option<DecoderHandle>,
}

impl EventShim {
    pub fn new(console: Arc<dyn Console>) -> Self {
        Self {
            console,
            counter: MessageCounter::new(),
            policy: ErrorPolicy::Fatal,
            decoder: None,
        }
    }

    #[inline] pub fn counter(&self) -> MessageCounter         { self.counter }
    #[inline] pub fn policy(&self) -> ErrorPolicy             { self.policy }
    #[inline] pub fn decoder(&self) -> Option<&DecoderHandle> { self.decoder.as_ref() }

    /// Constructs the decoder. Its readiness is not observed until [`Self::watch_decoder`].
    pub fn init_decoder<F>(&mut self, factory: &F, cfg: &DecoderConfig) -> Result<&DecoderHandle, ShimError>
    where
        F: DecoderFactory + ?Sized,
    {
        let handle: &DecoderHandle = self.decoder.insert(factory.construct(cfg)?);
        Ok(handle)
    }

    /// Logs one line once the decoder reports ready. If it already is, the line
    /// is logged right away.
    pub fn watch_decoder(&self) -> Result<(), ShimError> {
        let Some(handle) = &self.decoder else {
            return Ok(());
        };
        let console = Arc::clone(&self.console);
        handle.on_ready(move || console.log(LogLine::DecoderReady))?;
        Ok(())
    }

    pub fn print_sequence(&self) {
        for i in 0..SEQUENCE_LEN {
            self.console.log(LogLine::Sequence(i));
        }
    }

    /// Connects with binary frames delivered as raw buffers, whatever `cfg` says.
    pub async fn open_socket(
        &self,
        cfg: &ListenerConfig,
    ) -> Result<(SocketClient, Receiver<SocketEvent>), ShimError> {
        let cfg = cfg.clone().with_binary_type(BinaryType::Raw);
        Ok(SocketClient::connect(&cfg).await?)
    }

    pub fn dispatch(&mut self, event: SocketEvent) -> Result<Flow, ShimError> {
        let name = event.name();
        let res = match event {
            SocketEvent::Open => self.on_open(),
            SocketEvent::Message(payload) => self.on_message(payload),
            SocketEvent::Closed { reason } => {
                tau_debug!("Socket closed: {}", reason.as_deref().unwrap_or("no reason"));
                return Ok(Flow::Stop);
            }
            SocketEvent::Connection => Err(ShimError::UnexpectedEvent(name)),
        };
        self.policy.apply(name, res).map(|()| Flow::Continue)
    }

    fn on_open(&mut self) -> Result<(), ShimError> {
        self.console.log(LogLine::Opened);
        Ok(())
    }

    fn on_message(&mut self, payload: Payload) -> Result<(), ShimError> {
        if let Payload::Binary(bytes) = &payload {
            match ogg::classify(bytes) {
                Ok(kind) => tau_debug!("Inbound Ogg page: {:?}", kind),
                Err(e) => tau_debug!("Inbound frame is not an Ogg page: {}", e),
            }
        }
        self.console.log(LogLine::Payload(payload));
        self.console.log(LogLine::Count(self.counter.observe()));
        Ok(())
    }

    /// Drains `events` until the socket closes. Returns the final counter.
    pub async fn pump(&mut self, events: &mut Receiver<SocketEvent>) -> Result<MessageCounter, ShimError> {
        while let Some(event) = events.recv().await {
            if self.dispatch(event)? == Flow::Stop {
                break;
            }
        }
        Ok(self.counter)
    }

    /// Full listener lifecycle: decoder, startup sequence, socket, event loop.
    pub async fn run<F>(
        &mut self,
        factory: &F,
        decoder_cfg: &DecoderConfig,
        listener_cfg: &ListenerConfig,
    ) -> Result<MessageCounter, ShimError>
    where
        F: DecoderFactory + ?Sized,
    {
        self.init_decoder(factory, decoder_cfg)?;
        self.print_sequence();
        // Registered after the sequence so the ready line can never land inside it.
        self.watch_decoder()?;

        let (client, mut events) = self.open_socket(listener_cfg).await?;
        tau_info!("Listening on {}", client.url());

        let counter = self.pump(&mut events).await?;
        tau_info!("Connection {} ended after {} messages", client.id(), counter.value());
        Ok(counter)
    }
}

//! Ogg/Opus decoder capability.
//!
//! The decoder is an external capability as far as the listener is concerned:
//! it can be constructed from a [`DecoderConfig`] and it announces, once, that
//! its background worker has finished initializing. Nothing here decodes audio.

use crate::config::DecoderConfig;
use crate::{tau_debug, tau_warn};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;

/// Sample rates an Opus decoder can produce.
pub const SUPPORTED_SAMPLE_RATES: [u32; 5] = [8_000, 12_000, 16_000, 24_000, 48_000];

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Failed to start decoder worker: {0}")]
    Worker(#[from] std::io::Error),

    #[error("A readiness continuation is already registered")]
    ReadyAlreadyRegistered,
}

type Continuation = Box<dyn FnOnce() + Send + 'static>;

enum ReadyState {
    Pending(Option<Continuation>),
    /// Set once the worker is up. `consumed` tracks whether a continuation already ran.
    Ready { consumed: bool },
}

/// One-shot readiness notification.
#[derive(Clone)]
pub struct ReadySignal {
    state: Arc<Mutex<ReadyState>>,
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self { state: Arc::new(Mutex::new(ReadyState::Pending(None))) }
    }
}

impl ReadySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the continuation. It runs immediately if the signal already fired.
    pub fn then<F>(&self, f: F) -> Result<(), DecoderError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let run_now = match &mut *state {
            ReadyState::Pending(slot) if slot.is_none() => {
                *slot = Some(Box::new(f));
                return Ok(());
            }
            ReadyState::Ready { consumed } if !*consumed => {
                *consumed = true;
                true
            }
            _ => false,
        };
        drop(state);

        if run_now {
            f();
            Ok(())
        } else {
            Err(DecoderError::ReadyAlreadyRegistered)
        }
    }

    /// Fires the signal. Later calls are no-ops.
    pub fn complete(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let continuation = match &mut *state {
            ReadyState::Pending(slot) => slot.take(),
            ReadyState::Ready { .. } => return,
        };
        *state = ReadyState::Ready { consumed: continuation.is_some() };
        drop(state);
        if let Some(f) = continuation {
            f();
        }
    }

    pub fn is_ready(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*state, ReadyState::Ready { .. })
    }
}

enum WorkerCommand {
    Shutdown,
}

/// Handle to a constructed decoder and its background worker.
pub struct DecoderHandle {
    config: DecoderConfig,
    ready: ReadySignal,
    worker: Option<(Sender<WorkerCommand>, JoinHandle<()>)>,
}

impl std::fmt::Debug for DecoderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderHandle")
            .field("config", &self.config)
            .field("ready", &self.ready.is_ready())
            .finish()
    }
}

impl DecoderHandle {
    /// Handle without a worker. Readiness is driven by whoever holds the signal.
    pub fn detached(config: DecoderConfig, ready: ReadySignal) -> Self {
        Self { config, ready, worker: None }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn ready(&self) -> &ReadySignal {
        &self.ready
    }

    /// Runs `f` once the decoder is ready. Only one continuation may be registered.
    pub fn on_ready<F>(&self, f: F) -> Result<(), DecoderError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ready.then(f)
    }
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        if let Some((tx, jh)) = self.worker.take() {
            let _ = tx.send(WorkerCommand::Shutdown);
            if jh.join().is_err() {
                tau_warn!("Decoder worker panicked");
            }
        }
    }
}

pub trait DecoderFactory {
    fn construct(&self, config: &DecoderConfig) -> Result<DecoderHandle, DecoderError>;
}

/// Builds decoders whose initialization runs on a dedicated worker thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkerDecoderFactory;

impl DecoderFactory for WorkerDecoderFactory {
    fn construct(&self, config: &DecoderConfig) -> Result<DecoderHandle, DecoderError> {
        if !SUPPORTED_SAMPLE_RATES.contains(&config.sample_rate) {
            return Err(DecoderError::UnsupportedSampleRate(config.sample_rate));
        }

        let ready = ReadySignal::new();
        let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>();
        let worker_ready = ready.clone();
        let worker_cfg = config.clone();

        let jh = std::thread::Builder::new()
            .name("opus-decoder-worker".into())
            .spawn(move || {
                tau_debug!(
                    "Decoder worker up: {} Hz, force_stereo={}, enhancement={}",
                    worker_cfg.sample_rate,
                    worker_cfg.force_stereo,
                    worker_cfg.speech_quality_enhancement.as_str()
                );
                worker_ready.complete();

                // Park until the handle goes away.
                match cmd_rx.recv() {
                    Ok(WorkerCommand::Shutdown) | Err(_) => {
                        tau_debug!("Decoder worker shutting down");
                    }
                }
            })?;

        Ok(DecoderHandle {
            config: config.clone(),
            ready,
            worker: Some((cmd_tx, jh)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn continuation_registered_before_completion_runs_once() {
        let signal = ReadySignal::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        signal.then(move || { h.fetch_add(1, Ordering::SeqCst); }).unwrap();

        signal.complete();
        signal.complete();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn continuation_after_completion_runs_immediately() {
        let signal = ReadySignal::new();
        signal.complete();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        signal.then(move || { h.fetch_add(1, Ordering::SeqCst); }).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_continuation_is_rejected() {
        let signal = ReadySignal::new();
        signal.then(|| {}).unwrap();
        assert!(matches!(signal.then(|| {}), Err(DecoderError::ReadyAlreadyRegistered)));
        signal.complete();
        assert!(matches!(signal.then(|| {}), Err(DecoderError::ReadyAlreadyRegistered)));
    }

    #[test]
    fn unsupported_sample_rate_is_refused() {
        let cfg = DecoderConfig::default().with_sample_rate(44_100);
        let res = WorkerDecoderFactory.construct(&cfg);
        assert!(matches!(res, Err(DecoderError::UnsupportedSampleRate(44_100))));
    }
}


pub mod args;
pub mod client;
pub mod config;
pub mod console;
pub mod decoder;
pub mod http;
pub mod message;
pub mod ogg;
pub mod relay;
pub mod shim;
pub mod tau_log;

/* Re-exports */
pub use client::{ClientError, SocketClient};
pub use args::RelayArgs;
pub use config::{ConfigError, Credentials, DecoderConfig, ListenerConfig, RelayConfig, SpeechEnhancement};
pub use console::{Console, LogConsole, LogLine, MemoryConsole};
pub use decoder::{DecoderError, DecoderFactory, DecoderHandle, WorkerDecoderFactory};
pub use http::HttpFrontend;
pub use message::{Payload, RelayEvent, SocketEvent};
pub use ogg::{HeaderCache, OggError, PageKind};
pub use relay::{PageRelay, RelayError};
pub use shim::{ErrorPolicy, EventShim, MessageCounter, ShimError};

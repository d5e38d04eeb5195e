use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_LISTENER_URL: &str = "ws://127.0.0.1:9001";
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:9001";
pub const DEFAULT_INGEST_ADDR: &str = "127.0.0.1:8001";
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8002";
pub const DEFAULT_MOUNT: &str = "tau.ogg";
pub const DEFAULT_STATIC_DIR: &str = "client";

/// How binary frames are handed to the application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryType {
    /// Raw byte buffers, untouched.
    #[default]
    Raw,
    /// Lossy UTF-8 text.
    Utf8,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ListenerConfig {
    pub address: String,
    #[serde(default)]
    pub binary_type: BinaryType,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER_URL.to_string())
    }
}

impl ListenerConfig {
    pub fn new(address: String) -> Self {
        Self { address, binary_type: BinaryType::Raw, credentials: None }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn with_binary_type(mut self, binary_type: BinaryType) -> Self {
        self.binary_type = binary_type;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn binary_type(&self) -> BinaryType {
        self.binary_type
    }
}

/// Post-processing applied by the decoder to low bitrate speech.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEnhancement {
    None,
    Lace,
    #[default]
    NoLace,
}

impl SpeechEnhancement {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechEnhancement::None => "none",
            SpeechEnhancement::Lace => "lace",
            SpeechEnhancement::NoLace => "nolace",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DecoderConfig {
    pub force_stereo: bool,
    pub speech_quality_enhancement: SpeechEnhancement,
    pub sample_rate: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            force_stereo: false,
            speech_quality_enhancement: SpeechEnhancement::NoLace,
            sample_rate: 48_000,
        }
    }
}

impl DecoderConfig {
    pub fn with_force_stereo(mut self, force_stereo: bool) -> Self {
        self.force_stereo = force_stereo;
        self
    }

    pub fn with_speech_enhancement(mut self, enhancement: SpeechEnhancement) -> Self {
        self.speech_quality_enhancement = enhancement;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

/// Shared secret a listener presents in its upgrade request headers.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub broadcast_port: u16,
}

impl Credentials {
    pub const USERNAME_HEADER: &'static str = "username";
    pub const PASSWORD_HEADER: &'static str = "password";
    pub const PORT_HEADER: &'static str = "port";

    pub fn new(username: String, password: String, broadcast_port: u16) -> Self {
        Self { username, password, broadcast_port }
    }

    pub fn validate(&self, username: Option<&str>, password: Option<&str>, port: Option<u16>) -> bool {
        username == Some(self.username.as_str())
            && password == Some(self.password.as_str())
            && port == Some(self.broadcast_port)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub address: String,
    pub no_delay: bool,
    pub ingest_address: Option<String>,
    pub http_address: Option<String>,
    pub mount: String,
    pub static_dir: PathBuf,
    pub credentials: Option<Credentials>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_RELAY_ADDR.to_string(),
            no_delay: true,
            ingest_address: None,
            http_address: None,
            mount: DEFAULT_MOUNT.to_string(),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            credentials: None,
        }
    }
}

impl RelayConfig {
    pub fn new(address: String, no_delay: bool) -> Self {
        Self { address, no_delay, ..Self::default() }
    }

    pub fn with_ingest_address(mut self, address: String) -> Self {
        self.ingest_address = Some(address);
        self
    }

    pub fn with_http_address(mut self, address: String) -> Self {
        self.http_address = Some(address);
        self
    }

    pub fn with_mount(mut self, mount: String) -> Self {
        self.mount = mount;
        self
    }

    pub fn with_static_dir(mut self, dir: PathBuf) -> Self {
        self.static_dir = dir;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn no_delay(&self) -> bool {
        self.no_delay
    }

    pub fn ingest_address(&self) -> Option<&str> {
        self.ingest_address.as_deref()
    }

    pub fn http_address(&self) -> Option<&str> {
        self.http_address.as_deref()
    }

    /// Mount endpoint without its leading slash.
    pub fn mount(&self) -> &str {
        self.mount.trim_start_matches('/')
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// `$XDG_CONFIG_HOME/tau/relay.toml`, else `$HOME/.config/tau/relay.toml`.
    pub fn default_path() -> PathBuf {
        let local = Path::new("tau").join("relay.toml");
        match (std::env::var_os("XDG_CONFIG_HOME"), std::env::var_os("HOME")) {
            (Some(xdg), _) => PathBuf::from(xdg).join(local),
            (None, Some(home)) => PathBuf::from(home).join(".config").join(local),
            (None, None) => PathBuf::from("relay.toml"),
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Loads `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

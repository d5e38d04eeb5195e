use clap::Parser;
use std::path::PathBuf;

use crate::config::{ConfigError, Credentials, RelayConfig};

#[derive(Parser, Debug, Default)]
#[clap(name = "tau_relay", about = "Relays an Ogg Opus stream to WebSocket and HTTP listeners")]
pub struct RelayArgs {
    /// Config file, defaults to $XDG_CONFIG_HOME/tau/relay.toml
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// WebSocket listen address
    #[clap(short = 'l', long)]
    pub listen: Option<String>,

    /// UDP ingest address
    #[clap(short = 'i', long)]
    pub ingest: Option<String>,

    /// HTTP listen address for the listener page and the mount
    #[clap(long)]
    pub http: Option<String>,

    /// Mount endpoint
    #[clap(short, long)]
    pub mount: Option<String>,

    /// Directory served on the HTTP side
    #[clap(long)]
    pub static_dir: Option<PathBuf>,

    /// Listener username
    #[clap(long, requires = "password")]
    pub username: Option<String>,

    /// Listener password
    #[clap(long, requires = "username")]
    pub password: Option<String>,

    /// Broadcast port listeners must announce
    #[clap(short, long)]
    pub port: Option<u16>,
}

impl RelayArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(RelayConfig::default_path)
    }

    /// Config file (or defaults) with the command line laid on top.
    pub fn load_config(&self) -> Result<RelayConfig, ConfigError> {
        Ok(self.merge_into(RelayConfig::load_or_default(&self.config_path())?))
    }

    pub fn merge_into(&self, mut cfg: RelayConfig) -> RelayConfig {
        if let Some(addr) = &self.listen {
            cfg.address = addr.clone();
        }
        if let Some(addr) = &self.ingest {
            cfg.ingest_address = Some(addr.clone());
        }
        if let Some(addr) = &self.http {
            cfg.http_address = Some(addr.clone());
        }
        if let Some(mount) = &self.mount {
            cfg.mount = mount.clone();
        }
        if let Some(dir) = &self.static_dir {
            cfg.static_dir = dir.clone();
        }

        if let (Some(u), Some(p)) = (&self.username, &self.password) {
            let port = self
                .port
                .or(cfg.credentials.as_ref().map(|c| c.broadcast_port))
                .unwrap_or(0);
            cfg.credentials = Some(Credentials::new(u.clone(), p.clone(), port));
        } else if let (Some(port), Some(creds)) = (self.port, cfg.credentials.as_mut()) {
            creds.broadcast_port = port;
        }
        cfg
    }
}

use std::sync::Arc;

use clap::Parser;
use tau_probe::config::{DEFAULT_HTTP_ADDR, DEFAULT_INGEST_ADDR};
use tau_probe::message::RelayEvent;
use tau_probe::{HttpFrontend, PageRelay, RelayArgs, tau_info, tau_warn};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = RelayArgs::parse();
    let mut cfg = args.load_config()?;
    if cfg.ingest_address().is_none() {
        cfg = cfg.with_ingest_address(DEFAULT_INGEST_ADDR.to_string());
    }
    if cfg.http_address().is_none() {
        cfg = cfg.with_http_address(DEFAULT_HTTP_ADDR.to_string());
    }
    if cfg.credentials().is_none() {
        tau_warn!("No credentials configured, any listener may join");
    }

    let ingest = cfg.ingest_address().map(str::to_string);
    let http = cfg.http_address().map(str::to_string);
    let relay = Arc::new(PageRelay::bind(cfg).await?);

    if let Some(addr) = ingest {
        let r = Arc::clone(&relay);
        tokio::spawn(async move {
            if let Err(e) = r.ingest_udp(&addr).await {
                tau_warn!("UDP ingest stopped: {}", e);
            }
        });
    }

    if let Some(addr) = http {
        let frontend = Arc::new(HttpFrontend::bind(&addr, Arc::clone(&relay)).await?);
        tau_info!("Stream available at {}", frontend.mount_url());
        tokio::spawn(frontend.run());
    }

    let (tx, mut rx) = mpsc::channel::<RelayEvent>(100);
    tokio::spawn(Arc::clone(&relay).run(tx));

    while let Some(event) = rx.recv().await {
        match event {
            RelayEvent::Joined { peer_id } => tau_info!("Listener {} joined ({} total)", peer_id, relay.peer_count()),
            RelayEvent::Left { peer_id } => tau_info!("Listener {} left ({} total)", peer_id, relay.peer_count()),
            RelayEvent::Inbound { peer_id, len } => tau_warn!("Listener {} sent {} unexpected bytes", peer_id, len),
            RelayEvent::Error { peer_id, error } => tau_warn!("Listener {} failed: {}", peer_id, error),
        }
    }
    Ok(())
}

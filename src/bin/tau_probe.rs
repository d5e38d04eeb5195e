use std::sync::Arc;

use tau_probe::{
    DecoderConfig, EventShim, ListenerConfig, LogConsole, WorkerDecoderFactory, tau_info,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut shim = EventShim::new(Arc::new(LogConsole));
    let counter = shim
        .run(&WorkerDecoderFactory, &DecoderConfig::default(), &ListenerConfig::default())
        .await?;

    tau_info!("Received {} messages", counter.value());
    Ok(())
}

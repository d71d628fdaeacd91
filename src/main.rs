//! Rocket Crash Server
//!
//! Authoritative server binary: one engine tick loop, many observers.
//! Configuration comes from the environment; everything else is defaults.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rocket_crash::core::clock::SystemClock;
use rocket_crash::core::rng::SeededCrashSource;
use rocket_crash::network::server::{CrashServer, ServerConfig};
use rocket_crash::{GROWTH_RATE, TICK_INTERVAL_MS, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Rocket Crash Server v{}", VERSION);
    info!(
        "Tick interval: {}ms, growth rate: {}",
        TICK_INTERVAL_MS, GROWTH_RATE
    );

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("CRASH_BIND_ADDR") {
        config.bind_addr = addr.parse().context("invalid CRASH_BIND_ADDR")?;
    }

    let server_seed = load_server_seed()?;
    info!("Server seed: {}", hex::encode(server_seed));

    let source = SeededCrashSource::from_server_seed(&server_seed)
        .with_max_multiplier(config.engine.max_multiplier);

    let server = CrashServer::new(config, Arc::new(SystemClock), Box::new(source));
    server.run().await.context("server terminated")?;
    Ok(())
}

/// Operator-pinned seed from `CRASH_SERVER_SEED` (64 hex chars), or fresh
/// entropy for this run.
fn load_server_seed() -> anyhow::Result<[u8; 32]> {
    let mut server_seed = [0u8; 32];
    match std::env::var("CRASH_SERVER_SEED") {
        Ok(encoded) => {
            let bytes = hex::decode(&encoded).context("invalid CRASH_SERVER_SEED hex")?;
            if bytes.len() != 32 {
                anyhow::bail!("CRASH_SERVER_SEED must be 32 bytes of hex");
            }
            server_seed.copy_from_slice(&bytes);
        }
        Err(_) => {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            for (i, byte) in nanos.to_le_bytes().iter().enumerate() {
                server_seed[i] = *byte;
            }
        }
    }
    Ok(server_seed)
}

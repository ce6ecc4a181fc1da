//! echo-kv server.
//!
//! This binary runs a TCP server that speaks RESP to its clients.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use echo_kv::cli::ServerArgs;
use echo_kv::{aof, server, Store};

/// Entry point for the server.
#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,echo_kv=debug"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = ServerArgs::parse();
    let config = args.to_config();

    tracing::info!("echo-kv server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        keys_limit = ?config.get_keys_limit(),
        strategy = %config.get_eviction_strategy(),
        ratio = config.get_eviction_ratio(),
        aof_file = %config.get_aof_file().display(),
        "configuration"
    );

    let mut store = Store::new(config);
    if args.load_aof {
        let path = store.config().get_aof_file().to_path_buf();
        match aof::load_aof(&path, &mut store) {
            Ok(replayed) => tracing::info!(replayed, keys = store.len(), "AOF replay done"),
            Err(e) => tracing::error!(error = %e, "failed to load AOF file"),
        }
    }

    server::run(store).await?;
    Ok(())
}

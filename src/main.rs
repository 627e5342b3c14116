use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pastel_rpc_bench::config::BenchConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pastel_rpc_bench=info,warn")),
        )
        .init();

    info!("Starting Pastel RPC benchmark");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading benchmark config from {}", path);
            BenchConfig::from_file(&path).with_context(|| format!("loading {}", path))?
        }
        None => BenchConfig::default(),
    };

    pastel_rpc_bench::run(config).await
}

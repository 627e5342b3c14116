use pastel_rpc_bench::mock::{MockBehavior, MockNode};
use std::net::SocketAddr;
use tracing::info;

/// Local stand-in node for dry runs: `mock_node [port]`, credentials user/pass.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("pastel_rpc_bench=debug,info")
        .init();

    let port = std::env::args()
        .nth(1)
        .and_then(|p| p.parse().ok())
        .unwrap_or(19932);

    let node = MockNode::bind(
        SocketAddr::from(([127, 0, 0, 1], port)),
        MockBehavior::default(),
    )
    .await?;
    info!("Mock node ready on {} (rpcuser=user, rpcpassword=pass)", node.addr());

    tokio::select! {
        _ = node.wait() => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}

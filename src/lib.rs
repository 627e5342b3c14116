pub mod bench;
pub mod config;
pub mod mock;
pub mod report;
pub mod rpc;

use anyhow::Result;
use tracing::info;

use bench::Driver;
use config::{BenchConfig, NodeSettings};
use report::ResultLog;
use rpc::{ClientOptions, RpcClient};

/// Loads the node settings, then benchmarks every operation (or ramps when
/// configured). Nothing is written to the results file before the node
/// config has been read.
pub async fn run(config: BenchConfig) -> Result<()> {
    let node = NodeSettings::from_file(&config.pastel_conf)?;

    let client = RpcClient::new(
        &node,
        &ClientOptions {
            timeout: config.request_timeout(),
            max_in_flight: config.max_in_flight,
            max_connections: config.max_connections,
            ..Default::default()
        },
    )?;
    info!("Benchmarking node at {}", client.endpoint());

    let log = ResultLog::new(&config.results_file);
    info!("Appending results to {}", log.path().display());

    let ramp = config.ramp.clone();
    let driver = Driver::new(client, config, log);
    match ramp {
        Some(ramp) => {
            driver.ramp(&ramp).await?;
        }
        None => {
            let summaries = driver.run().await?;
            let succeeded: usize = summaries.iter().map(|s| s.succeeded).sum();
            let attempted: usize = summaries.iter().map(|s| s.attempted).sum();
            info!("Done: {}/{} calls succeeded", succeeded, attempted);
        }
    }

    Ok(())
}

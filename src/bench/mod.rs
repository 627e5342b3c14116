mod batch;

pub use batch::{BenchSummary, FailureTally, calls_per_second, run_batch};

use std::fmt;
use std::io;
use tracing::{info, warn};

use crate::config::{BenchConfig, ConcurrencyConfig, RampConfig};
use crate::report::ResultLog;
use crate::rpc::RpcClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PastelIdNewKey,
    PastelIdSign,
    PastelIdVerify,
    BestBlockHash,
    GetBlock,
    RawTransaction,
    MasternodeTop,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::PastelIdNewKey,
        Operation::PastelIdSign,
        Operation::PastelIdVerify,
        Operation::BestBlockHash,
        Operation::GetBlock,
        Operation::RawTransaction,
        Operation::MasternodeTop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::PastelIdNewKey => "pastelid_newkey",
            Operation::PastelIdSign => "pastelid_sign",
            Operation::PastelIdVerify => "pastelid_verify",
            Operation::BestBlockHash => "getbestblockhash",
            Operation::GetBlock => "getblock",
            Operation::RawTransaction => "getrawtransaction",
            Operation::MasternodeTop => "masternode_top",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inputs the templated operations need, gathered once before the batches.
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    pub pastelid: String,
    pub signature: String,
    pub block_hashes: Vec<String>,
    pub txids: Vec<String>,
}

fn pick(items: &[String], i: usize) -> &str {
    if items.is_empty() {
        ""
    } else {
        &items[i % items.len()]
    }
}

pub struct Driver {
    client: RpcClient,
    config: BenchConfig,
    log: ResultLog,
}

impl Driver {
    pub fn new(client: RpcClient, config: BenchConfig, log: ResultLog) -> Self {
        Self {
            client,
            config,
            log,
        }
    }

    /// Runs every operation once at the configured concurrency.
    pub async fn run(&self) -> io::Result<Vec<BenchSummary>> {
        let fixtures = self.prepare().await;
        self.run_round(&self.config.concurrency, &fixtures).await
    }

    /// Repeats full rounds, growing each batch by `ramp.step`, until a round
    /// has any failed call or the batch size passes `ramp.max_concurrency`.
    /// Returns the largest batch size of a round that fully succeeded.
    pub async fn ramp(&self, ramp: &RampConfig) -> io::Result<usize> {
        let fixtures = self.prepare().await;
        let mut concurrency = self.config.concurrency.clone();
        let mut best = 0;

        while concurrency.max() <= ramp.max_concurrency {
            let summaries = self.run_round(&concurrency, &fixtures).await?;
            let failed: usize = summaries.iter().map(BenchSummary::failed).sum();
            if failed > 0 {
                warn!(
                    "Round at concurrency {} had {} failed calls, stopping",
                    concurrency.max(),
                    failed
                );
                self.log
                    .append_note(&format!(
                        "ramp stopped: failed at concurrency={} failed_calls={}",
                        concurrency.max(),
                        failed
                    ))
                    .await?;
                break;
            }
            best = concurrency.max();
            info!("Round at concurrency {} fully succeeded", best);

            if ramp.step == 0 {
                break;
            }
            concurrency = concurrency.stepped(ramp.step);
        }

        self.log
            .append_note(&format!("max_successful_concurrency={}", best))
            .await?;
        info!("Maximum successful concurrency: {}", best);
        Ok(best)
    }

    async fn run_round(
        &self,
        concurrency: &ConcurrencyConfig,
        fixtures: &Fixtures,
    ) -> io::Result<Vec<BenchSummary>> {
        let mut summaries = Vec::with_capacity(Operation::ALL.len());
        for op in Operation::ALL {
            let n = concurrency.for_operation(op);
            let summary = self.run_operation(op, n, fixtures).await;
            info!(
                "{}: {}/{} succeeded in {:.3}s ({})",
                op,
                summary.succeeded,
                summary.attempted,
                summary.elapsed.as_secs_f64(),
                match summary.rate {
                    Some(rate) => format!("{:.2} calls/s", rate),
                    None => "rate n/a".to_string(),
                }
            );
            self.log.append(&summary).await?;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    pub async fn run_operation(&self, op: Operation, n: usize, fx: &Fixtures) -> BenchSummary {
        let client = &self.client;
        let passphrase = self.config.passphrase.as_str();
        let message = self.config.message.as_str();

        match op {
            Operation::PastelIdNewKey => run_batch(op, n, |_| client.new_pastelid(passphrase)).await,
            Operation::PastelIdSign => {
                run_batch(op, n, |_| client.sign_message(&fx.pastelid, message, passphrase)).await
            }
            Operation::PastelIdVerify => {
                run_batch(op, n, |_| client.verify_message(&fx.pastelid, message, &fx.signature))
                    .await
            }
            Operation::BestBlockHash => run_batch(op, n, |_| client.best_block_hash()).await,
            Operation::GetBlock => {
                run_batch(op, n, |i| client.block(pick(&fx.block_hashes, i))).await
            }
            Operation::RawTransaction => {
                run_batch(op, n, |i| client.raw_transaction(pick(&fx.txids, i))).await
            }
            Operation::MasternodeTop => run_batch(op, n, |_| client.masternode_top()).await,
        }
    }

    /// Creates the signing identity and collects recent chain data. Any step
    /// that fails leaves its fixture empty; the dependent batch then fails
    /// call by call on the node side.
    pub async fn prepare(&self) -> Fixtures {
        let mut fixtures = Fixtures::default();

        match self.client.new_pastelid(&self.config.passphrase).await {
            Ok(pastelid) => {
                info!("Created PastelID {}", pastelid);
                fixtures.pastelid = pastelid;
            }
            Err(e) => warn!("Could not create PastelID: {}", e),
        }

        if !fixtures.pastelid.is_empty() {
            match self
                .client
                .sign_message(&fixtures.pastelid, &self.config.message, &self.config.passphrase)
                .await
            {
                Ok(signature) => fixtures.signature = signature,
                Err(e) => warn!("Could not sign benchmark message: {}", e),
            }
        }

        match self.client.recent_blocks(self.config.recent_blocks).await {
            Ok(recent) => {
                fixtures.block_hashes = recent.hashes;
                fixtures.txids = recent.txids;
            }
            Err(e) => warn!("Could not read recent blocks: {}", e),
        }

        fixtures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_cycles_and_tolerates_empty_lists() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(pick(&items, 0), "a");
        assert_eq!(pick(&items, 3), "b");
        assert_eq!(pick(&[], 5), "");
    }

    #[test]
    fn operation_names_match_rpc_surface() {
        let names: Vec<_> = Operation::ALL.iter().map(Operation::name).collect();
        assert_eq!(
            names,
            [
                "pastelid_newkey",
                "pastelid_sign",
                "pastelid_verify",
                "getbestblockhash",
                "getblock",
                "getrawtransaction",
                "masternode_top",
            ]
        );
    }
}

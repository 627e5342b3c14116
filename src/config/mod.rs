mod node;

pub use node::{ConfigError, NodeSettings};

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::bench::Operation;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BenchConfig {
    pub pastel_conf: PathBuf,
    pub results_file: PathBuf,
    pub passphrase: String,
    pub message: String,
    pub request_timeout_secs: u64,
    pub max_in_flight: usize,
    pub max_connections: usize,
    pub recent_blocks: u64,
    pub concurrency: ConcurrencyConfig,
    pub ramp: Option<RampConfig>,
}

/// Number of simultaneous calls fired per operation batch.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub pastelid_newkey: usize,
    pub pastelid_sign: usize,
    pub pastelid_verify: usize,
    pub getbestblockhash: usize,
    pub getblock: usize,
    pub getrawtransaction: usize,
    pub masternode_top: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RampConfig {
    pub step: usize,
    pub max_concurrency: usize,
}

const DEFAULT_CONCURRENCY: usize = 25;

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            pastel_conf: default_pastel_conf(),
            results_file: PathBuf::from("rpc_benchmark_results.txt"),
            passphrase: "your_passphrase_here".to_string(),
            message: "some_message".to_string(),
            request_timeout_secs: 90,
            max_in_flight: 1000,
            max_connections: 200,
            recent_blocks: 5,
            concurrency: ConcurrencyConfig::default(),
            ramp: None,
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self::uniform(DEFAULT_CONCURRENCY)
    }
}

impl ConcurrencyConfig {
    pub fn uniform(n: usize) -> Self {
        Self {
            pastelid_newkey: n,
            pastelid_sign: n,
            pastelid_verify: n,
            getbestblockhash: n,
            getblock: n,
            getrawtransaction: n,
            masternode_top: n,
        }
    }

    pub fn for_operation(&self, op: Operation) -> usize {
        match op {
            Operation::PastelIdNewKey => self.pastelid_newkey,
            Operation::PastelIdSign => self.pastelid_sign,
            Operation::PastelIdVerify => self.pastelid_verify,
            Operation::BestBlockHash => self.getbestblockhash,
            Operation::GetBlock => self.getblock,
            Operation::RawTransaction => self.getrawtransaction,
            Operation::MasternodeTop => self.masternode_top,
        }
    }

    /// Adds `step` calls to every operation's batch size.
    pub fn stepped(&self, step: usize) -> Self {
        Self {
            pastelid_newkey: self.pastelid_newkey + step,
            pastelid_sign: self.pastelid_sign + step,
            pastelid_verify: self.pastelid_verify + step,
            getbestblockhash: self.getbestblockhash + step,
            getblock: self.getblock + step,
            getrawtransaction: self.getrawtransaction + step,
            masternode_top: self.masternode_top + step,
        }
    }

    pub fn max(&self) -> usize {
        Operation::ALL
            .iter()
            .map(|op| self.for_operation(*op))
            .max()
            .unwrap_or(0)
    }
}

impl BenchConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BenchConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_pastel_conf() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".pastel").join("pastel.conf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: BenchConfig = toml::from_str(
            r#"
            passphrase = "hunter2"
            results_file = "/tmp/out.txt"

            [concurrency]
            getblock = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.passphrase, "hunter2");
        assert_eq!(config.results_file, PathBuf::from("/tmp/out.txt"));
        assert_eq!(config.concurrency.getblock, 7);
        assert_eq!(config.concurrency.masternode_top, DEFAULT_CONCURRENCY);
        assert_eq!(config.request_timeout(), Duration::from_secs(90));
        assert_eq!(config.max_connections, 200);
        assert!(config.ramp.is_none());
    }

    #[test]
    fn ramp_section_is_parsed() {
        let config: BenchConfig = toml::from_str(
            r#"
            [ramp]
            step = 10
            max_concurrency = 100
            "#,
        )
        .unwrap();

        let ramp = config.ramp.unwrap();
        assert_eq!(ramp.step, 10);
        assert_eq!(ramp.max_concurrency, 100);
    }

    #[test]
    fn stepped_concurrency_grows_every_operation() {
        let base = ConcurrencyConfig::uniform(5);
        let next = base.stepped(10);
        for op in Operation::ALL {
            assert_eq!(next.for_operation(op), 15);
        }
        assert_eq!(next.max(), 15);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(BenchConfig::from_file("/nonexistent/bench.toml").is_err());
    }
}

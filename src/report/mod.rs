use chrono::{DateTime, SecondsFormat, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::bench::BenchSummary;

/// Append-only text file holding one line per benchmarked operation.
#[derive(Debug, Clone)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, summary: &BenchSummary) -> io::Result<()> {
        self.write_line(&format_summary(summary, Utc::now())).await
    }

    pub async fn append_note(&self, note: &str) -> io::Result<()> {
        self.write_line(&format!("{} {}", timestamp(Utc::now()), note))
            .await
    }

    async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;
        debug!("Appended to {}: {}", self.path.display(), line);
        Ok(())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn format_summary(summary: &BenchSummary, at: DateTime<Utc>) -> String {
    let rate = match summary.rate {
        Some(rate) => format!("{:.2}/s", rate),
        None => "n/a".to_string(),
    };
    let mut line = format!(
        "{} {} succeeded={}/{} rate={} elapsed={}ms",
        timestamp(at),
        summary.operation,
        summary.succeeded,
        summary.attempted,
        rate,
        summary.elapsed.as_millis()
    );

    let f = &summary.failures;
    if f.total() > 0 {
        line.push_str(&format!(
            " failures=connection:{},authentication:{},application:{},protocol:{}",
            f.connection, f.authentication, f.application, f.protocol
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::{FailureTally, Operation};
    use chrono::TimeZone;
    use std::time::Duration;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn formats_successful_batch() {
        let summary = BenchSummary::new(
            Operation::BestBlockHash,
            10,
            10,
            Duration::from_millis(50),
            FailureTally::default(),
        );

        assert_eq!(
            format_summary(&summary, at()),
            "2024-05-01T12:30:00.000000Z getbestblockhash succeeded=10/10 rate=200.00/s elapsed=50ms"
        );
    }

    #[test]
    fn undefined_rate_and_failures_are_spelled_out() {
        let failures = FailureTally {
            connection: 2,
            application: 1,
            ..Default::default()
        };
        let summary = BenchSummary::new(Operation::GetBlock, 3, 0, Duration::ZERO, failures);

        let line = format_summary(&summary, at());
        assert!(line.contains("getblock succeeded=0/3 rate=n/a"));
        assert!(line.ends_with("failures=connection:2,authentication:0,application:1,protocol:0"));
    }
}

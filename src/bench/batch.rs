use futures::future::join_all;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::Operation;
use crate::rpc::{FailureKind, RpcError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureTally {
    pub connection: usize,
    pub authentication: usize,
    pub application: usize,
    pub protocol: usize,
}

impl FailureTally {
    pub fn record(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::Connection => self.connection += 1,
            FailureKind::Authentication => self.authentication += 1,
            FailureKind::Application => self.application += 1,
            FailureKind::Protocol => self.protocol += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.connection + self.authentication + self.application + self.protocol
    }
}

#[derive(Debug, Clone)]
pub struct BenchSummary {
    pub operation: Operation,
    pub attempted: usize,
    pub succeeded: usize,
    pub elapsed: Duration,
    /// Successful calls per second; `None` when no time elapsed.
    pub rate: Option<f64>,
    pub failures: FailureTally,
}

impl BenchSummary {
    pub fn new(
        operation: Operation,
        attempted: usize,
        succeeded: usize,
        elapsed: Duration,
        failures: FailureTally,
    ) -> Self {
        debug_assert!(succeeded <= attempted);
        Self {
            operation,
            attempted,
            succeeded,
            elapsed,
            rate: calls_per_second(succeeded, elapsed),
            failures,
        }
    }

    pub fn failed(&self) -> usize {
        self.attempted.saturating_sub(self.succeeded)
    }
}

pub fn calls_per_second(succeeded: usize, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (secs > 0.0).then(|| succeeded as f64 / secs)
}

/// Fires `n` calls built by `make_call` at once and waits for every one of
/// them. A failed call never cancels the rest of the batch.
pub async fn run_batch<F, Fut, T>(operation: Operation, n: usize, make_call: F) -> BenchSummary
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let calls: Vec<Fut> = (0..n).map(make_call).collect();

    let start = Instant::now();
    let outcomes = join_all(calls).await;
    let elapsed = start.elapsed();

    let mut succeeded = 0;
    let mut failures = FailureTally::default();
    for outcome in outcomes {
        match outcome {
            Ok(_) => succeeded += 1,
            Err(e) => {
                debug!("{} call failed: {}", operation, e);
                failures.record(e.kind());
            }
        }
    }

    if failures.authentication > 0 {
        warn!(
            "{}: {} calls rejected by the node, check rpcuser/rpcpassword",
            operation, failures.authentication
        );
    }

    BenchSummary::new(operation, n, succeeded, elapsed, failures)
}

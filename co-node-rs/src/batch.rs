//! Concurrent batch submission
//!
//! Every invocation runs as its own task; a task that loses an
//! optimistic-concurrency race backs off and resubmits against fresh state.

use co_core::{ChargingOptionContract, Ledger, MarketError, Outcome};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Base delay between conflicting attempts
const RETRY_BACKOFF: Duration = Duration::from_millis(2);

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// 1-based line number in the input
    pub line: usize,
    pub function: String,
    pub args: Vec<String>,
}

/// Why a batch line failed
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Market(#[from] MarketError),

    #[error("task failed: {0}")]
    Task(String),
}

/// Final result of one invocation
#[derive(Debug)]
pub struct BatchResult {
    pub invocation: Invocation,
    pub attempts: u32,
    pub result: Result<Outcome, BatchError>,
}

/// Parse `function arg1 arg2 ...`; blank lines and `#` comments yield `None`
pub fn parse_line(line: usize, text: &str) -> Option<Invocation> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return None;
    }

    let mut parts = text.split_whitespace();
    let function = parts.next()?.to_string();
    Some(Invocation {
        line,
        function,
        args: parts.map(str::to_string).collect(),
    })
}

/// Parse a whole batch file
pub fn parse_batch(input: &str) -> Vec<Invocation> {
    input
        .lines()
        .enumerate()
        .filter_map(|(i, text)| parse_line(i + 1, text))
        .collect()
}

/// Submit all invocations concurrently; results are returned in input order
pub async fn run_batch(
    contract: Arc<ChargingOptionContract>,
    ledger: Arc<Ledger>,
    invocations: Vec<Invocation>,
    max_retries: u32,
) -> Vec<BatchResult> {
    let handles: Vec<_> = invocations
        .into_iter()
        .map(|invocation| {
            let contract = Arc::clone(&contract);
            let ledger = Arc::clone(&ledger);
            let handle = tokio::spawn(submit_with_retry(contract, ledger, invocation.clone(), max_retries));
            (invocation, handle)
        })
        .collect();

    collect_in_order(handles).await
}

/// Await every task in spawn order; a task that died still yields its line
async fn collect_in_order(handles: Vec<(Invocation, JoinHandle<BatchResult>)>) -> Vec<BatchResult> {
    let mut results = Vec::with_capacity(handles.len());
    for (invocation, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!("Batch: line {} task failed: {}", invocation.line, e);
                results.push(BatchResult {
                    invocation,
                    attempts: 0,
                    result: Err(BatchError::Task(e.to_string())),
                });
            }
        }
    }
    results
}

async fn submit_with_retry(
    contract: Arc<ChargingOptionContract>,
    ledger: Arc<Ledger>,
    invocation: Invocation,
    max_retries: u32,
) -> BatchResult {
    let mut attempts = 0;

    loop {
        attempts += 1;

        let contract = Arc::clone(&contract);
        let ledger = Arc::clone(&ledger);
        let function = invocation.function.clone();
        let args = invocation.args.clone();
        let joined = tokio::task::spawn_blocking(move || contract.submit(&ledger, &function, &args)).await;

        let result = match joined {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) if e.is_conflict() && attempts <= max_retries => {
                debug!(
                    "Batch: line {} ({}) conflicted, retry {}/{}",
                    invocation.line, invocation.function, attempts, max_retries
                );
                tokio::time::sleep(RETRY_BACKOFF * attempts).await;
                continue;
            }
            Ok(Err(e)) => Err(BatchError::Market(e)),
            Err(e) => Err(BatchError::Task(e.to_string())),
        };

        return BatchResult {
            invocation,
            attempts,
            result,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use co_core::MarketConfig;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(1, "   "), None);
        assert_eq!(parse_line(2, "# initLedger"), None);

        let inv = parse_line(3, "buy CO1 car1 0  0 3").unwrap();
        assert_eq!(inv.line, 3);
        assert_eq!(inv.function, "buy");
        assert_eq!(inv.args, vec!["CO1", "car1", "0", "0", "3"]);

        let inv = parse_line(4, "queryList").unwrap();
        assert!(inv.args.is_empty());
    }

    #[test]
    fn test_parse_batch_numbers_lines() {
        let batch = parse_batch("initLedger\n\n# comment\nconfirm CO1\n");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].line, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_batch_retries_conflicts() {
        let contract = Arc::new(ChargingOptionContract::new(MarketConfig::default()).unwrap());
        let ledger = Arc::new(Ledger::in_memory());
        contract.submit::<&str>(&ledger, "initLedger", &[]).unwrap();

        let input = "buy A car 0 0 4\nbuy B car 0 1 5\nbuy C car 0 2 6\nbuy D car 0 3 7\n";
        let results = run_batch(contract, Arc::clone(&ledger), parse_batch(input), 64).await;

        assert_eq!(results.len(), 4);
        for (r, key) in results.iter().zip(["A", "B", "C", "D"]) {
            assert!(r.result.is_ok(), "line {}: {:?}", r.invocation.line, r.result);
            assert!(ledger.get(key).is_some());
        }
        // 4 invocations plus initLedger, each committed exactly once
        assert_eq!(ledger.height(), 5);
    }

    #[tokio::test]
    async fn test_batch_reports_failures_in_order() {
        let contract = Arc::new(ChargingOptionContract::new(MarketConfig::default()).unwrap());
        let ledger = Arc::new(Ledger::in_memory());

        let input = "initLedger\nconfirm nope\nqueryPrice 0 1\n";
        let results = run_batch(contract, ledger, parse_batch(input), 0).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[1].invocation.function, "confirm");
        assert!(matches!(
            results[1].result,
            Err(BatchError::Market(MarketError::OptionNotFound(_)))
        ));
        assert_eq!(results[1].attempts, 1);
    }

    async fn panicking_task() -> BatchResult {
        panic!("worker panicked")
    }

    #[tokio::test]
    async fn test_failed_task_keeps_its_line() {
        let first = parse_line(1, "queryList").unwrap();
        let second = parse_line(2, "queryCO CO1").unwrap();
        let third = parse_line(3, "queryList").unwrap();

        let done = |invocation: Invocation| BatchResult {
            invocation,
            attempts: 1,
            result: Err(BatchError::Market(MarketError::OptionNotFound("CO1".into()))),
        };
        let handles = vec![
            (first.clone(), tokio::spawn(std::future::ready(done(first.clone())))),
            (second.clone(), tokio::spawn(panicking_task())),
            (third.clone(), tokio::spawn(std::future::ready(done(third.clone())))),
        ];

        let results = collect_in_order(handles).await;
        let lines: Vec<usize> = results.iter().map(|r| r.invocation.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
        assert_eq!(results[1].invocation, second);
        assert_eq!(results[1].attempts, 0);
        assert!(matches!(results[1].result, Err(BatchError::Task(_))));
    }
}

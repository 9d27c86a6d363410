use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::domain;
use crate::queue::SharedReceiver;
use crate::scanner::join_all;
use crate::stats::Stats;
use crate::types::{ScanOutcome, ScanStatus};

/// Output lines for one outcome under the given configuration.
pub fn render(outcome: &ScanOutcome, config: &PipelineConfig) -> Vec<String> {
    if let Some(cert) = outcome.certificate() {
        if config.emit_json {
            return match serde_json::to_string(cert) {
                Ok(line) => vec![line],
                Err(e) => {
                    debug!(addr = %outcome.address, error = %e, "dropping unserializable record");
                    Vec::new()
                }
            };
        }
        return cert
            .domains
            .iter()
            .filter(|d| domain::accept(d, config.include_wildcards))
            .cloned()
            .collect();
    }

    if !config.debug_failures {
        return Vec::new();
    }
    match outcome.status() {
        ScanStatus::Timeout => vec![format!(
            "Timed Out. No SSL certificate found for {}",
            outcome.address
        )],
        _ => {
            let cause = outcome
                .error_cause()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            vec![format!(
                "Failed to get SSL certificate from {}: {}",
                outcome.address, cause
            )]
        }
    }
}

/// Fixed-size set of workers that filter and format outcomes.
pub struct ResultPool {
    workers: JoinSet<usize>,
    output: mpsc::Sender<String>,
}

impl ResultPool {
    /// Start `size` workers sharing `outcomes`. Every outcome is counted in `stats`
    /// when one is given.
    pub fn spawn(
        config: Arc<PipelineConfig>,
        size: usize,
        outcomes: SharedReceiver<ScanOutcome>,
        output: mpsc::Sender<String>,
        stats: Option<Arc<Stats>>,
    ) -> Self {
        let mut workers = JoinSet::new();
        for id in 0..size.max(1) {
            let config = config.clone();
            let outcomes = outcomes.clone();
            let tx = output.clone();
            let stats = stats.clone();
            workers.spawn(async move {
                let mut lines = 0usize;
                while let Some(outcome) = outcomes.recv().await {
                    if let Some(s) = &stats {
                        s.record(&outcome);
                    }
                    for line in render(&outcome, &config) {
                        if tx.send(line).await.is_err() {
                            // Keep consuming so the scan pool never blocks on a full queue.
                            warn!(worker = id, "output queue closed, discarding line");
                            continue;
                        }
                        lines += 1;
                    }
                }
                lines
            });
        }
        debug!(workers = size.max(1), "result pool started");
        Self { workers, output }
    }

    /// Wait for every worker to drain the outcome queue, then close the output queue.
    ///
    /// Returns the number of lines written to the output queue.
    pub async fn join(self) -> usize {
        let Self {
            mut workers,
            output,
        } = self;
        let total = join_all(&mut workers, "result").await;
        drop(output);
        debug!(lines = total, "result pool stopped");
        total
    }
}

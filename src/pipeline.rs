//! Wiring of target feed, scan pool, result pool and sink.
//!
//! Every queue is closed by its single owner once that owner knows no further
//! writes can happen:
//!
//! 1. the feeder drops the scan queue sender when the input is exhausted;
//! 2. the scan pool joins its workers, then drops the outcome queue sender;
//! 3. the result pool joins its workers, then drops the output queue sender;
//! 4. the sink drains the output queue until it closes.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{PipelineConfig, OUTPUT_QUEUE_CAPACITY};
use crate::queue;
use crate::results::ResultPool;
use crate::scanner::{Prober, ScanPool, TlsProber};
use crate::stats::Stats;
use crate::targets::{self, TargetSpec};
use crate::types::RunSummary;

/// Scan every target in `specs` over real TLS and write output lines to `sink`.
pub async fn run<W>(
    config: PipelineConfig,
    specs: Vec<TargetSpec>,
    sink: W,
    stats: Option<Arc<Stats>>,
    cancel: CancellationToken,
) -> Result<RunSummary>
where
    W: AsyncWrite + Unpin,
{
    let prober = TlsProber::new(config.handshake_timeout)?;
    run_with_prober(config, specs, Arc::new(prober), sink, stats, cancel).await
}

/// Same as [`run`] with a caller-supplied prober.
pub async fn run_with_prober<P, W>(
    config: PipelineConfig,
    specs: Vec<TargetSpec>,
    prober: Arc<P>,
    sink: W,
    stats: Option<Arc<Stats>>,
    cancel: CancellationToken,
) -> Result<RunSummary>
where
    P: Prober,
    W: AsyncWrite + Unpin,
{
    let config = Arc::new(config.normalized());
    info!(
        scan_workers = config.scan_concurrency,
        result_workers = config.result_concurrency,
        ports = ?config.ports,
        timeout = ?config.handshake_timeout,
        expected_targets = targets::target_count(&specs, &config.ports),
        "starting pipeline"
    );

    let (target_tx, target_rx) = queue::bounded(config.scan_concurrency);
    let (outcome_tx, outcome_rx) = queue::bounded(config.scan_concurrency);
    let (line_tx, line_rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);

    let result_pool = ResultPool::spawn(
        config.clone(),
        config.result_concurrency,
        outcome_rx,
        line_tx,
        stats,
    );
    let scan_pool = ScanPool::spawn(prober, config.scan_concurrency, target_rx, outcome_tx);
    let feeder = tokio::spawn(targets::feed_targets(
        specs,
        config.ports.clone(),
        target_tx,
        cancel,
    ));

    // Shutdown runs alongside the sink: each stage closes its downstream queue only
    // after it has been joined.
    let shutdown = tokio::spawn(async move {
        let sent = join_task(feeder, "target feeder").await?;
        let outcomes = scan_pool.join().await;
        let lines = result_pool.join().await;
        Ok::<_, anyhow::Error>((sent, outcomes as u64, lines as u64))
    });

    let written = drain_to_sink(line_rx, sink).await;

    let (sent, outcomes, lines) = join_task(shutdown, "pipeline shutdown").await??;
    let written = written?;

    if outcomes != sent {
        error!(sent, outcomes, "outcome count does not match target count");
    }
    debug_assert_eq!(outcomes, sent);
    debug_assert_eq!(lines, written);

    let summary = RunSummary {
        targets: sent,
        outcomes,
        lines: written,
    };
    info!(?summary, "pipeline finished");
    Ok(summary)
}

/// Await a spawned stage. A panic inside it is re-raised on the caller.
async fn join_task<T>(handle: JoinHandle<T>, stage: &'static str) -> Result<T> {
    match handle.await {
        Ok(v) => Ok(v),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(e).with_context(|| format!("{stage} failed")),
    }
}

/// Write every line until the output queue closes.
///
/// A write failure does not stop the drain: upstream workers must never block on a
/// full queue. The first error is returned once the queue is closed.
async fn drain_to_sink<W>(mut lines: mpsc::Receiver<String>, sink: W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::new(sink);
    let mut written = 0u64;
    let mut failure: Option<std::io::Error> = None;

    while let Some(line) = lines.recv().await {
        written += 1;
        if failure.is_some() {
            continue;
        }
        let res = async {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await
        }
        .await;
        if let Err(e) = res {
            error!(error = %e, "failed to write output, discarding remaining lines");
            failure = Some(e);
        }
    }

    if let Some(e) = failure {
        return Err(e).context("failed to write results");
    }
    out.flush().await.context("failed to flush results")?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ScanError;
    use crate::types::CertificateRecord;

    /// A sink whose reader has gone away.
    struct Broken;

    impl AsyncWrite for Broken {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut TaskContext<'_>,
            _: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Every target answers with twenty names.
    struct ManyNames;

    #[async_trait]
    impl Prober for ManyNames {
        async fn probe(&self, target: &str) -> Result<CertificateRecord, ScanError> {
            let label = target.replace([':', '.'], "-");
            Ok(CertificateRecord {
                origin_address: target.to_string(),
                domains: (0..20).map(|i| format!("n{i}.h{label}.example.com")).collect(),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn sink_writes_one_line_per_item() {
        let (tx, rx) = mpsc::channel(4);
        tx.send("a.example.com".to_string()).await.unwrap();
        tx.send("b.example.com".to_string()).await.unwrap();
        drop(tx);

        let mut buf = Vec::new();
        assert_eq!(drain_to_sink(rx, &mut buf).await.unwrap(), 2);
        assert_eq!(String::from_utf8(buf).unwrap(), "a.example.com\nb.example.com\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn broken_sink_fails_the_run_without_stalling_workers() {
        let specs = targets::parse_entries(&["10.6.0.0/22".to_string()]);
        let run = run_with_prober(
            PipelineConfig::default(),
            specs,
            Arc::new(ManyNames),
            Broken,
            None,
            CancellationToken::new(),
        );
        let err = tokio::time::timeout(Duration::from_secs(30), run)
            .await
            .expect("pipeline finished")
            .unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("failed to write results"), "{msg}");
        assert!(msg.contains("gone"), "{msg}");
    }

    #[tokio::test]
    #[should_panic(expected = "feeder bug")]
    async fn stage_panic_is_reraised() {
        let feeder = tokio::spawn(async { panic!("feeder bug") });
        let _ = join_task(feeder, "target feeder").await;
    }

    #[tokio::test]
    async fn aborted_stage_is_an_error() {
        let feeder = tokio::spawn(std::future::pending::<u64>());
        feeder.abort();
        let err = join_task(feeder, "target feeder").await.unwrap_err();
        assert!(err.to_string().contains("target feeder failed"), "{err}");
    }
}

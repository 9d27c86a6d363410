use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time;
use tokio_native_tls::TlsConnector;
use tracing::{debug, error, trace};

use crate::error::ScanError;
use crate::queue::SharedReceiver;
use crate::types::{CertificateRecord, ScanOutcome, ScanTarget};

/// Fetches and parses the leaf certificate of one target.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, target: &str) -> Result<CertificateRecord, ScanError>;
}

/// Performs a real TCP connect and TLS handshake, accepting any certificate.
#[derive(Clone)]
pub struct TlsProber {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .context("failed to build TLS connector")?;
        Ok(Self {
            connector: TlsConnector::from(connector),
            timeout,
        })
    }

    async fn handshake(&self, target: &str) -> Result<CertificateRecord, ScanError> {
        let stream = TcpStream::connect(target).await?;
        let tls = self.connector.connect(server_name(target), stream).await?;
        let cert = tls
            .get_ref()
            .peer_certificate()?
            .ok_or(ScanError::NoCertificate)?;
        let der = cert.to_der()?;
        CertificateRecord::from_der(target, &der)
    }
}

#[async_trait]
impl Prober for TlsProber {
    async fn probe(&self, target: &str) -> Result<CertificateRecord, ScanError> {
        match time::timeout(self.timeout, self.handshake(target)).await {
            Ok(res) => res,
            Err(_) => Err(ScanError::Timeout),
        }
    }
}

/// Host part of `host:port`, without IPv6 brackets.
fn server_name(target: &str) -> &str {
    let host = target.rsplit_once(':').map_or(target, |(h, _)| h);
    host.trim_start_matches('[').trim_end_matches(']')
}

/// Turn a probe result into the outcome record for `target`.
pub fn classify(target: ScanTarget, res: Result<CertificateRecord, ScanError>) -> ScanOutcome {
    match res {
        Ok(cert) => ScanOutcome::hit(target, cert),
        Err(e) if e.is_timeout() => ScanOutcome::timeout(target),
        Err(e) => ScanOutcome::error(target, e),
    }
}

/// Fixed-size set of workers that turn targets into outcomes.
pub struct ScanPool {
    workers: JoinSet<usize>,
    outcomes: mpsc::Sender<ScanOutcome>,
}

impl ScanPool {
    /// Start `size` workers sharing `targets`. Each target yields exactly one outcome.
    pub fn spawn<P: Prober>(
        prober: Arc<P>,
        size: usize,
        targets: SharedReceiver<ScanTarget>,
        outcomes: mpsc::Sender<ScanOutcome>,
    ) -> Self {
        let mut workers = JoinSet::new();
        for id in 0..size.max(1) {
            let prober = prober.clone();
            let targets = targets.clone();
            let tx = outcomes.clone();
            workers.spawn(async move {
                let mut done = 0usize;
                while let Some(target) = targets.recv().await {
                    trace!(worker = id, addr = %target, "probing");
                    let res = prober.probe(&target).await;
                    let outcome = classify(target, res);
                    if tx.send(outcome).await.is_err() {
                        error!(worker = id, "outcome queue closed while scanning");
                        break;
                    }
                    done += 1;
                }
                done
            });
        }
        debug!(workers = size.max(1), "scan pool started");
        Self { workers, outcomes }
    }

    /// Wait for every worker to drain the target queue, then close the outcome queue.
    ///
    /// Returns the number of outcomes emitted. A worker panic is re-raised.
    pub async fn join(self) -> usize {
        let Self {
            mut workers,
            outcomes,
        } = self;
        let total = join_all(&mut workers, "scan").await;
        drop(outcomes);
        debug!(outcomes = total, "scan pool stopped");
        total
    }
}

/// Drain a worker set, summing per-worker counts and propagating panics.
pub(crate) async fn join_all(workers: &mut JoinSet<usize>, pool: &str) -> usize {
    let mut total = 0usize;
    while let Some(res) = workers.join_next().await {
        match res {
            Ok(n) => total += n,
            Err(e) if e.is_panic() => {
                error!(pool, "worker panicked");
                std::panic::resume_unwind(e.into_panic());
            }
            Err(e) => error!(pool, error = %e, "worker aborted"),
        }
    }
    total
}

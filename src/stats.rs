use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::types::ScanOutcome;

/// Hit/miss tally. `total == hits + misses` at every observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsCounters {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
}

impl StatsCounters {
    pub fn hit_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.hits as f64 / self.total as f64 * 100.0
    }
}

/// Shared, thread-safe progress counters for a single run.
#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<StatsCounters>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatsCounters> {
        // Counters stay consistent even if a holder panicked mid-run.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, outcome: &ScanOutcome) {
        let mut c = self.lock();
        c.total += 1;
        if outcome.is_hit() {
            c.hits += 1;
        } else {
            c.misses += 1;
        }
    }

    pub fn snapshot(&self) -> StatsCounters {
        *self.lock()
    }

    /// Overwritable one-line progress display.
    pub fn render(&self) -> String {
        let c = self.snapshot();
        format!(
            "\r\x1b[KHits: {}, Misses: {}, Total: {}, Hit Rate: {:.2}%",
            c.hits,
            c.misses,
            c.total,
            c.hit_percentage()
        )
    }
}

/// Periodically redraw the progress line on stderr until `cancel` fires.
pub fn spawn_ticker(
    stats: Arc<Stats>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let mut err = std::io::stderr().lock();
                    let _ = write!(err, "{}", stats.render());
                    let _ = err.flush();
                }
            }
        }
        let _ = writeln!(std::io::stderr(), "{}", stats.render());
    })
}

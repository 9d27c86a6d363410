use std::time::Duration;

/// Lower bound on scan workers; large inputs are unbearably slow below this.
pub const MIN_SCAN_CONCURRENCY: usize = 100;
pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT_SECS: u64 = 4;
/// Capacity of the queue between the result workers and the sink.
pub const OUTPUT_QUEUE_CAPACITY: usize = 10_000;

/// Run options consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub scan_concurrency: usize,
    pub result_concurrency: usize,
    pub ports: Vec<u16>,
    pub handshake_timeout: Duration,
    pub emit_json: bool,
    pub include_wildcards: bool,
    pub debug_failures: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scan_concurrency: MIN_SCAN_CONCURRENCY,
            result_concurrency: MIN_SCAN_CONCURRENCY,
            ports: vec![DEFAULT_PORT],
            handshake_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            emit_json: false,
            include_wildcards: false,
            debug_failures: false,
        }
    }
}

impl PipelineConfig {
    /// Apply the worker-count floors. The pipeline only ever runs a normalized config.
    pub fn normalized(mut self) -> Self {
        self.scan_concurrency = self.scan_concurrency.max(MIN_SCAN_CONCURRENCY);
        self.result_concurrency = self.result_concurrency.max(1);
        if self.ports.is_empty() {
            self.ports.push(DEFAULT_PORT);
        }
        self
    }
}

//! Library crate for certscan-rs: concurrent TLS certificate scraping for
//! passive domain and asset discovery.
pub mod cert;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod ports;
pub mod queue;
pub mod results;
pub mod scanner;
pub mod stats;
pub mod targets;
pub mod types;

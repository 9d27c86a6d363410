use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use ipnet::{IpNet, Ipv4Net};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::ScanTarget;

/// One line of user input: a single address, a CIDR block or a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Ip(IpAddr),
    Cidr(IpNet),
    Host(String),
}

impl FromStr for TargetSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty target");
        }
        if s.contains('/') {
            let net: IpNet = s.parse().with_context(|| format!("invalid CIDR: {s}"))?;
            return Ok(TargetSpec::Cidr(net));
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(TargetSpec::Ip(ip));
        }
        if s.chars().any(|c| c.is_whitespace() || c == ':' || c == '[' || c == ']') {
            bail!("invalid target: {s}");
        }
        Ok(TargetSpec::Host(s.to_string()))
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Ip(ip) => write!(f, "{ip}"),
            TargetSpec::Cidr(net) => write!(f, "{net}"),
            TargetSpec::Host(h) => f.write_str(h),
        }
    }
}

impl TargetSpec {
    /// Lazily iterate every host this entry stands for.
    pub fn hosts(&self) -> Box<dyn Iterator<Item = String> + Send + '_> {
        match self {
            TargetSpec::Ip(ip) => Box::new(std::iter::once(ip.to_string())),
            TargetSpec::Cidr(IpNet::V4(n4)) => {
                Box::new(expand_ipv4net_all(*n4).map(|ip| ip.to_string()))
            }
            TargetSpec::Cidr(IpNet::V6(n6)) => Box::new(n6.hosts().map(|ip| ip.to_string())),
            TargetSpec::Host(h) => Box::new(std::iter::once(h.clone())),
        }
    }

    /// Number of hosts `hosts()` yields, saturating for very large IPv6 prefixes.
    pub fn host_count(&self) -> u64 {
        match self {
            TargetSpec::Ip(_) | TargetSpec::Host(_) => 1,
            TargetSpec::Cidr(IpNet::V4(n4)) => 1u64 << (32 - u32::from(n4.prefix_len())),
            TargetSpec::Cidr(IpNet::V6(n6)) => {
                let bits = 128 - u32::from(n6.prefix_len());
                if bits >= 64 {
                    u64::MAX
                } else {
                    1u64 << bits
                }
            }
        }
    }
}

/// Every address of an IPv4 block, network and broadcast included.
fn expand_ipv4net_all(net: Ipv4Net) -> impl Iterator<Item = Ipv4Addr> + Send {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    (start..=end).map(Ipv4Addr::from)
}

/// Render a scan target. Bare IPv6 addresses are bracketed.
pub fn format_target(host: &str, port: u16) -> ScanTarget {
    if host.parse::<Ipv6Addr>().is_ok() {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Split raw input into entries: commas and newlines separate, blanks are dropped.
pub fn split_entries(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read entries line by line from any buffered reader (file or stdin).
pub async fn read_entries<R: AsyncBufRead + Unpin>(reader: R) -> Result<Vec<String>> {
    let mut lines = reader.lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        out.extend(split_entries(&line));
    }
    Ok(out)
}

/// Resolve the `-i` value: a path to an existing file is read line by line,
/// anything else is treated as a comma-separated list.
pub async fn load_input(spec: &str) -> Result<Vec<String>> {
    let path = Path::new(spec);
    if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
        debug!(path = %path.display(), "reading targets from file");
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open input file: {}", path.display()))?;
        return read_entries(BufReader::new(file)).await;
    }
    Ok(split_entries(spec))
}

/// Parse entries into target specs. Unparseable entries are reported and skipped.
pub fn parse_entries(entries: &[String]) -> Vec<TargetSpec> {
    entries
        .iter()
        .filter_map(|e| match e.parse::<TargetSpec>() {
            Ok(t) => Some(t),
            Err(err) => {
                warn!(entry = %e, error = %err, "skipping input entry");
                None
            }
        })
        .collect()
}

/// Number of targets `feed_targets` will produce if not cancelled.
pub fn target_count(specs: &[TargetSpec], ports: &[u16]) -> u64 {
    specs
        .iter()
        .map(TargetSpec::host_count)
        .fold(0u64, u64::saturating_add)
        .saturating_mul(ports.len() as u64)
}

/// Push one `host:port` per (address, port) into the scan queue.
///
/// This is the queue's only producer: returning drops `tx`, which closes the queue.
/// Stops early when `cancel` fires or when nobody is receiving any more.
pub async fn feed_targets(
    specs: Vec<TargetSpec>,
    ports: Vec<u16>,
    tx: mpsc::Sender<ScanTarget>,
    cancel: CancellationToken,
) -> u64 {
    let mut sent = 0u64;
    'outer: for spec in &specs {
        debug!(spec = %spec, hosts = spec.host_count(), "expanding input entry");
        for host in spec.hosts() {
            for &port in &ports {
                let target = format_target(&host, port);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(sent, "target feed cancelled");
                        break 'outer;
                    }
                    res = tx.send(target) => {
                        if res.is_err() {
                            warn!("scan queue closed before input was exhausted");
                            break 'outer;
                        }
                        sent += 1;
                    }
                }
            }
        }
    }
    debug!(sent, "target feed exhausted");
    sent
}

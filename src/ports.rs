use anyhow::{bail, Context, Result};
use std::collections::HashSet;

/// Parse a comma-separated port list into an ordered, deduplicated set (1..=65535).
///
/// Supported items:
/// - single port number: `443`
/// - inclusive range: `8443-8445`
/// - surrounding whitespace and empty items are ignored
pub fn parse_port_list(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for raw in s.split(',') {
        let item = raw.trim();
        if item.is_empty() {
            continue;
        }

        if let Some((a, b)) = item.split_once('-') {
            let start = parse_port_str(a.trim())
                .with_context(|| format!("invalid start in range: {item}"))?;
            let end = parse_port_str(b.trim())
                .with_context(|| format!("invalid end in range: {item}"))?;
            if start > end {
                bail!("invalid range {start}-{end} (start > end)");
            }
            for p in start..=end {
                if seen.insert(p) {
                    out.push(p);
                }
            }
            continue;
        }

        let p = parse_port_str(item).with_context(|| format!("invalid port value: {item}"))?;
        if seen.insert(p) {
            out.push(p);
        }
    }

    if out.is_empty() {
        bail!("no ports given");
    }
    Ok(out)
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_ports() {
        let ports = parse_port_list("443, 8443 ,4443").unwrap();
        assert_eq!(ports, vec![443, 8443, 4443]);
    }

    #[test]
    fn parse_ranges_and_dedup() {
        let ports = parse_port_list("8000-8002,443,8001").unwrap();
        assert_eq!(ports, vec![8000, 8001, 8002, 443]);
    }

    #[test]
    fn empty_items_are_skipped() {
        assert_eq!(parse_port_list("443,,").unwrap(), vec![443]);
    }

    #[test]
    fn invalid_values_error() {
        assert!(parse_port_list("70000").is_err());
        assert!(parse_port_list("https").is_err());
        assert!(parse_port_list("9000-8000").is_err());
        assert!(parse_port_list(" , ").is_err());
    }
}

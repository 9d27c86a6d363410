//! Acceptance filter applied to certificate names before they are printed.

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// A name whose leftmost label is exactly `*`, e.g. `*.example.com`.
pub fn is_wildcard(name: &str) -> bool {
    match name.split_once('.') {
        Some((first, rest)) => first == "*" && !rest.is_empty(),
        None => false,
    }
}

/// Syntactic DNS name check: at least two labels, no empty label, length limits,
/// letters/digits/hyphen/underscore only, and a non-numeric top label.
pub fn is_valid_domain(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 || !labels.iter().all(|l| is_valid_label(l)) {
        return false;
    }

    // Rules out bare IPv4 literals.
    labels
        .last()
        .is_some_and(|tld| !tld.bytes().all(|b| b.is_ascii_digit()))
}

fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }
    label
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Whether a certificate name should become an output line.
pub fn accept(name: &str, include_wildcards: bool) -> bool {
    let wildcard = is_wildcard(name);
    if include_wildcards {
        wildcard || is_valid_domain(name)
    } else {
        !wildcard && is_valid_domain(name)
    }
}

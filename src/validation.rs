//! Validation utilities for cfddns
//!
//! Domain names are checked once at configuration load. Addresses returned by
//! the public IP endpoints are checked on every lookup.

use anyhow::{bail, Result};

use crate::constants::{MAX_LABEL_LENGTH, MAX_RECORD_NAME_LENGTH};

/// Validates a DNS host name from the `[[domains]]` table
///
/// Accepts fully qualified names with an optional trailing dot, `_` labels
/// (service records) and a leading `*` wildcard label. Rejects empty labels,
/// labels that start or end with `-`, labels longer than 63 characters and
/// names longer than 253 characters.
///
/// ```
/// use cfddns::validation::validate_domain_name;
///
/// assert!(validate_domain_name("home.example.com").is_ok());
/// assert!(validate_domain_name("*.example.com").is_ok());
/// assert!(validate_domain_name("example..com").is_err());
/// assert!(validate_domain_name("-bad.example.com").is_err());
/// ```
pub fn validate_domain_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("domain name is empty");
    }
    if trimmed.contains(char::is_whitespace) {
        bail!("domain name '{}' contains whitespace", trimmed);
    }

    let name = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if name.len() > MAX_RECORD_NAME_LENGTH {
        bail!(
            "domain name is {} characters long (max {})",
            name.len(),
            MAX_RECORD_NAME_LENGTH
        );
    }

    for (index, label) in name.split('.').enumerate() {
        if label.is_empty() {
            bail!("domain name '{}' has an empty label", trimmed);
        }
        if label == "*" && index == 0 {
            continue;
        }
        if label.len() > MAX_LABEL_LENGTH {
            bail!(
                "label '{}' is {} characters long (max {})",
                label,
                label.len(),
                MAX_LABEL_LENGTH
            );
        }
        if label.starts_with('-') || label.ends_with('-') {
            bail!("label '{}' cannot start or end with '-'", label);
        }
        if let Some(ch) = label
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            bail!("domain name '{}' contains invalid character '{}'", trimmed, ch);
        }
    }

    Ok(())
}

/// Returns true for four dot-separated groups of 1-3 ASCII digits
///
/// Syntax only: `999.999.999.999` passes.
pub fn is_ipv4_syntax(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate.split('.').collect();
    groups.len() == 4
        && groups
            .iter()
            .all(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Returns true for exactly eight colon-separated groups of 1-4 hex digits
///
/// The `::` shorthand is not expanded, so compressed forms such as `::1` or
/// `2001:db8::1` are rejected.
pub fn is_ipv6_syntax(candidate: &str) -> bool {
    let groups: Vec<&str> = candidate.split(':').collect();
    groups.len() == 8
        && groups
            .iter()
            .all(|g| (1..=4).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Accepts whatever the public IP endpoints may legitimately return
pub fn is_valid_ip(candidate: &str) -> bool {
    is_ipv4_syntax(candidate) || is_ipv6_syntax(candidate)
}

//! DNS provider abstraction layer
//!
//! The reconciliation loop talks to the DNS host only through [`DnsProvider`],
//! so the Cloudflare client can be swapped for a fake in tests.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::DomainTarget;
use crate::constants::{DNS_RECORD_TYPE_A, DNS_RECORD_TYPE_AAAA};
use crate::validation::is_ipv4_syntax;

//==============================================================================
// Types
//==============================================================================

/// Host record types managed by cfddns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Picks the record type matching the address family of `ip`
    pub fn for_address(ip: &str) -> Self {
        if is_ipv4_syntax(ip) {
            RecordType::A
        } else {
            RecordType::Aaaa
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => DNS_RECORD_TYPE_A,
            RecordType::Aaaa => DNS_RECORD_TYPE_AAAA,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The provider's current state for one domain, fetched fresh every tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordSnapshot {
    /// Provider-assigned identifier, needed for updates
    pub id: String,
    /// Record type as reported by the provider
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Host name of the record
    pub name: String,
    /// Address currently published
    pub content: String,
}

impl fmt::Display for DnsRecordSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (ID: {})",
            self.record_type, self.name, self.content, self.id
        )
    }
}

//==============================================================================
// Trait
//==============================================================================

/// Reads and updates single host records at a DNS provider
///
/// Implementations own their retry behaviour: an `Err` means the call failed
/// after the provider's retry budget was spent.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Fetches the record of `record_type` for `target`
    ///
    /// Returns `Ok(None)` when the provider reports no matching record. That
    /// is not an error: a record that does not exist yet must not bring the
    /// loop down.
    async fn fetch_record(
        &self,
        target: &DomainTarget,
        record_type: RecordType,
    ) -> anyhow::Result<Option<DnsRecordSnapshot>>;

    /// Points `record` at `new_ip`, using the TTL and proxy flag of `target`
    ///
    /// Succeeds only when the provider confirms the update in its payload.
    async fn update_record(
        &self,
        target: &DomainTarget,
        record: &DnsRecordSnapshot,
        new_ip: &str,
    ) -> anyhow::Result<()>;
}

//==============================================================================
// Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_for_address() {
        assert_eq!(RecordType::for_address("203.0.113.7"), RecordType::A);
        assert_eq!(
            RecordType::for_address("2001:db8:0:0:0:0:0:1"),
            RecordType::Aaaa
        );
    }

    #[test]
    fn test_record_type_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&RecordType::A).unwrap(), "\"A\"");
        assert_eq!(serde_json::to_string(&RecordType::Aaaa).unwrap(), "\"AAAA\"");
        let parsed: RecordType = serde_json::from_str("\"AAAA\"").unwrap();
        assert_eq!(parsed, RecordType::Aaaa);
    }

    #[test]
    fn test_snapshot_display() {
        let record = DnsRecordSnapshot {
            id: "abc123".to_string(),
            record_type: RecordType::A,
            name: "home.example.com".to_string(),
            content: "203.0.113.7".to_string(),
        };

        let s = record.to_string();
        assert!(s.contains("home.example.com"));
        assert!(s.contains("203.0.113.7"));
        assert!(s.starts_with("A "));
    }
}

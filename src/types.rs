use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// One unit of scan work, rendered as `host:port`.
pub type ScanTarget = String;

/// Identity facts pulled out of a leaf certificate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub origin_address: String,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub common_name: String,
    pub subject_alternative_names: Vec<String>,
    /// Common name followed by every SAN DNS entry. Not deduplicated.
    pub domains: Vec<String>,
    pub email_addresses: Vec<String>,
    #[serde(rename = "advertisedIPAddresses")]
    pub advertised_ip_addresses: Vec<String>,
}

/// Classification of one handshake attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Hit,
    Timeout,
    Error,
}

#[derive(Debug)]
enum Payload {
    Certificate(Box<CertificateRecord>),
    Timeout,
    Error(ScanError),
}

/// Result of scanning one target.
///
/// The payload is private so a hit can only be built with a certificate and a
/// miss can never carry one.
#[derive(Debug)]
pub struct ScanOutcome {
    pub address: ScanTarget,
    payload: Payload,
}

impl ScanOutcome {
    pub fn hit(address: impl Into<String>, certificate: CertificateRecord) -> Self {
        Self {
            address: address.into(),
            payload: Payload::Certificate(Box::new(certificate)),
        }
    }

    pub fn timeout(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            payload: Payload::Timeout,
        }
    }

    pub fn error(address: impl Into<String>, cause: ScanError) -> Self {
        Self {
            address: address.into(),
            payload: Payload::Error(cause),
        }
    }

    pub fn status(&self) -> ScanStatus {
        match self.payload {
            Payload::Certificate(_) => ScanStatus::Hit,
            Payload::Timeout => ScanStatus::Timeout,
            Payload::Error(_) => ScanStatus::Error,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.status() == ScanStatus::Hit
    }

    pub fn certificate(&self) -> Option<&CertificateRecord> {
        match &self.payload {
            Payload::Certificate(cert) => Some(&**cert),
            _ => None,
        }
    }

    pub fn error_cause(&self) -> Option<&ScanError> {
        match &self.payload {
            Payload::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Counters returned by a finished pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub targets: u64,
    pub outcomes: u64,
    pub lines: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CertificateRecord {
        CertificateRecord {
            origin_address: "10.0.0.1:443".into(),
            common_name: "example.com".into(),
            domains: vec!["example.com".into()],
            ..Default::default()
        }
    }

    #[test]
    fn hit_always_carries_certificate() {
        let o = ScanOutcome::hit("10.0.0.1:443", sample());
        assert_eq!(o.status(), ScanStatus::Hit);
        assert!(o.certificate().is_some());
        assert!(o.error_cause().is_none());
    }

    #[test]
    fn misses_never_carry_certificate() {
        let outcomes = [
            ScanOutcome::timeout("10.0.0.2:443"),
            ScanOutcome::error("10.0.0.3:443", ScanError::NoCertificate),
        ];
        for o in &outcomes {
            assert!(!o.is_hit());
            assert!(o.certificate().is_none());
        }
        assert_eq!(outcomes[0].status(), ScanStatus::Timeout);
        assert!(outcomes[0].error_cause().is_none());
        assert_eq!(outcomes[1].status(), ScanStatus::Error);
        assert!(outcomes[1].error_cause().is_some());
    }

    #[test]
    fn record_uses_camel_case_field_names() {
        let v = serde_json::to_value(sample()).unwrap();
        for key in [
            "originAddress",
            "organization",
            "organizationalUnit",
            "commonName",
            "subjectAlternativeNames",
            "domains",
            "emailAddresses",
            "advertisedIPAddresses",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
    }
}

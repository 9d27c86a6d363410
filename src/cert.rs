use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::debug;
use x509_parser::der_parser::asn1_rs::Tag;
use x509_parser::prelude::*;

use crate::error::ScanError;
use crate::types::CertificateRecord;

impl CertificateRecord {
    /// Build a record from a DER-encoded leaf certificate.
    ///
    /// Only an unparseable certificate is an error. Individual fields that cannot be
    /// decoded are left out.
    pub fn from_der(origin: &str, der: &[u8]) -> Result<Self, ScanError> {
        let (_, x509) =
            parse_x509_certificate(der).map_err(|e| ScanError::Certificate(e.to_string()))?;

        let subject = x509.subject();
        let organization = collect_attrs(subject.iter_organization());
        let organizational_unit = collect_attrs(subject.iter_organizational_unit());
        let common_name = subject
            .iter_common_name()
            .find_map(attr_string)
            .unwrap_or_default();

        let mut sans = Vec::new();
        let mut emails = Vec::new();
        let mut ips = Vec::new();
        match x509.subject_alternative_name() {
            Ok(Some(ext)) => {
                for name in ext.value.general_names.iter() {
                    match name {
                        GeneralName::DNSName(d) => sans.push(d.to_string()),
                        GeneralName::RFC822Name(e) => emails.push(e.to_string()),
                        GeneralName::IPAddress(raw) => {
                            if let Some(ip) = ip_from_bytes(raw) {
                                ips.push(ip.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(None) => {}
            Err(e) => debug!(addr = origin, error = %e, "ignoring malformed SAN extension"),
        }

        let mut domains = Vec::with_capacity(sans.len() + 1);
        domains.push(common_name.clone());
        domains.extend(sans.iter().cloned());

        Ok(Self {
            origin_address: origin.to_string(),
            organization,
            organizational_unit,
            common_name,
            subject_alternative_names: sans,
            domains,
            email_addresses: emails,
            advertised_ip_addresses: ips,
        })
    }
}

fn collect_attrs<'a, 'b: 'a>(
    attrs: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
) -> Vec<String> {
    attrs.filter_map(attr_string).collect()
}

/// Decode a directory string. BMPString (UTF-16BE) and UniversalString (UTF-32BE)
/// are decoded by hand; anything undecodable is dropped.
fn attr_string(attr: &AttributeTypeAndValue<'_>) -> Option<String> {
    if let Ok(s) = attr.as_str() {
        return Some(s.to_string());
    }
    let raw = attr.as_slice();
    match attr.attr_value().tag() {
        Tag::BmpString if raw.len() % 2 == 0 => {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
        Tag::UniversalString if raw.len() % 4 == 0 => raw
            .chunks_exact(4)
            .map(|c| char::from_u32(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
        _ => None,
    }
}

fn ip_from_bytes(raw: &[u8]) -> Option<IpAddr> {
    match raw.len() {
        4 => {
            let b: [u8; 4] = raw.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(b)))
        }
        16 => {
            let b: [u8; 16] = raw.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(b)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_DER: &[u8] = include_bytes!("../tests/fixtures/cert.der");
    const BAD_SAN_DER: &[u8] = include_bytes!("../tests/fixtures/bad-san.der");
    const BMP_CN_DER: &[u8] = include_bytes!("../tests/fixtures/bmp-cn.der");

    #[test]
    fn extracts_subject_and_san_fields() {
        let rec = CertificateRecord::from_der("127.0.0.1:443", FULL_DER).unwrap();
        assert_eq!(rec.origin_address, "127.0.0.1:443");
        assert_eq!(rec.organization, vec!["Example Inc"]);
        assert_eq!(rec.organizational_unit, vec!["Infra"]);
        assert_eq!(rec.common_name, "example.com");
        assert_eq!(
            rec.subject_alternative_names,
            vec!["example.com", "www.example.com", "*.example.com"]
        );
        assert_eq!(rec.email_addresses, vec!["admin@example.com"]);
        assert_eq!(rec.advertised_ip_addresses, vec!["93.184.216.34"]);
    }

    #[test]
    fn domains_lead_with_common_name_without_dedup() {
        let rec = CertificateRecord::from_der("127.0.0.1:443", FULL_DER).unwrap();
        assert_eq!(
            rec.domains,
            vec!["example.com", "example.com", "www.example.com", "*.example.com"]
        );
    }

    #[test]
    fn garbage_is_a_certificate_error() {
        let err = CertificateRecord::from_der("x:443", b"not a certificate").unwrap_err();
        assert!(matches!(err, ScanError::Certificate(_)));
    }

    #[test]
    fn malformed_san_leaves_only_the_common_name() {
        let rec = CertificateRecord::from_der("10.0.0.7:443", BAD_SAN_DER).unwrap();
        assert_eq!(rec.common_name, "bad-san.example.com");
        assert!(rec.subject_alternative_names.is_empty());
        assert!(rec.email_addresses.is_empty());
        assert!(rec.advertised_ip_addresses.is_empty());
        assert_eq!(rec.domains, vec!["bad-san.example.com"]);
    }

    #[test]
    fn bmp_string_common_name_is_decoded() {
        let rec = CertificateRecord::from_der("10.0.0.8:443", BMP_CN_DER).unwrap();
        assert_eq!(rec.common_name, "bmp.example.com");
        assert_eq!(rec.organization, vec!["Example Inc"]);
        assert_eq!(rec.domains, vec!["bmp.example.com"]);
    }

    #[test]
    fn ip_bytes_of_odd_length_are_dropped() {
        assert_eq!(ip_from_bytes(&[10, 0, 0, 1]), Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert_eq!(ip_from_bytes(&[1, 2, 3]), None);
        assert!(matches!(ip_from_bytes(&[0; 16]), Some(IpAddr::V6(_))));
    }
}

use std::io;

use thiserror::Error;

/// Why a single target did not yield a certificate.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("handshake timed out")]
    Timeout,
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),
    #[error("tls handshake failed: {0}")]
    Tls(#[source] native_tls::Error),
    #[error("server presented no certificate")]
    NoCertificate,
    #[error("unreadable certificate: {0}")]
    Certificate(String),
}

impl ScanError {
    /// True when the failure was a deadline expiry rather than a refusal or protocol error.
    pub fn is_timeout(&self) -> bool {
        match self {
            ScanError::Timeout => true,
            ScanError::Connect(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

impl From<io::Error> for ScanError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::TimedOut {
            ScanError::Timeout
        } else {
            ScanError::Connect(e)
        }
    }
}

impl From<native_tls::Error> for ScanError {
    fn from(e: native_tls::Error) -> Self {
        ScanError::Tls(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_out_io_error_is_a_timeout() {
        let e: ScanError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(e.is_timeout());
        assert!(ScanError::Connect(io::Error::new(io::ErrorKind::TimedOut, "x")).is_timeout());
    }

    #[test]
    fn refused_is_not_a_timeout() {
        let e: ScanError = io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(!e.is_timeout());
        assert!(e.to_string().contains("refused"));
        assert!(!ScanError::NoCertificate.is_timeout());
    }
}

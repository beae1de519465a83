// Input validation applied before any scoring happens.

use regex::Regex;
use std::net::IpAddr;

use crate::error::TrustError;

/// Fingerprints are opaque client-generated tokens (hashes, base64, UUIDs).
pub fn valid_device_fingerprint(fingerprint: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9._:+/=-]{8,512}$").is_ok_and(|re| re.is_match(fingerprint))
}

pub(crate) fn parse_ip(ip_address: &str) -> Result<IpAddr, TrustError> {
    ip_address
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| TrustError::Validation(format!("invalid IP address: '{ip_address}'")))
}

pub(crate) fn validate_fingerprint(fingerprint: &str) -> Result<(), TrustError> {
    if valid_device_fingerprint(fingerprint) {
        Ok(())
    } else {
        Err(TrustError::Validation(
            "invalid device fingerprint".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_accepts_hashes_and_tokens() {
        assert!(valid_device_fingerprint("device-abc123"));
        assert!(valid_device_fingerprint(
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        ));
        assert!(valid_device_fingerprint("dGVzdC1kZXZpY2U="));
    }

    #[test]
    fn fingerprint_rejects_short_or_odd_values() {
        assert!(!valid_device_fingerprint(""));
        assert!(!valid_device_fingerprint("short"));
        assert!(!valid_device_fingerprint("has spaces in it"));
        assert!(!valid_device_fingerprint("<script>alert(1)</script>"));
    }

    #[test]
    fn parse_ip_accepts_v4_and_v6() {
        assert!(parse_ip("198.51.100.7").is_ok());
        assert!(parse_ip(" 2001:db8::1 ").is_ok());
    }

    #[test]
    fn parse_ip_rejects_garbage() {
        let err = parse_ip("999.1.1.1").unwrap_err();
        assert!(matches!(err, TrustError::Validation(_)));
    }
}

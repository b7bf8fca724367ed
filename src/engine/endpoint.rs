//! Endpoint type and request-boundary validation.
//!
//! The presentation layer hands the engine raw strings; everything here is
//! rejected before any engine state changes. Octets and ports must be in
//! canonical decimal form: "192.168.01.1" and "+80" are invalid even though
//! they parse.

use crate::{Error, Result};
use std::fmt;
use std::net::Ipv4Addr;

/// An IPv4 address/port pair as it appears at one hop of a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Parse a dotted-quad IPv4 address in canonical decimal form.
///
/// `field` names the request field for error reporting.
pub fn parse_ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr> {
    let invalid = || Error::InvalidAddress {
        field,
        value: value.to_string(),
    };

    let mut octets = [0u8; 4];
    let mut parts = value.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        *octet = parse_canonical_u16(part)
            .filter(|&n| n <= 255)
            .ok_or_else(invalid)? as u8;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok(Ipv4Addr::from(octets))
}

/// Parse a port in canonical decimal form, 1-65535.
pub fn parse_port(field: &'static str, value: &str) -> Result<u16> {
    parse_canonical_u16(value)
        .filter(|&n| n >= 1)
        .ok_or_else(|| Error::InvalidPort {
            field,
            value: value.to_string(),
        })
}

/// Canonical decimal: digits only, no sign, no leading zero (except "0").
fn parse_canonical_u16(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_valid() {
        assert_eq!(
            parse_ipv4("src", "192.168.1.100").unwrap(),
            Ipv4Addr::new(192, 168, 1, 100)
        );
        assert_eq!(parse_ipv4("src", "0.0.0.0").unwrap(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(
            parse_ipv4("src", "255.255.255.255").unwrap(),
            Ipv4Addr::BROADCAST
        );
    }

    #[test]
    fn test_parse_ipv4_rejects_malformed() {
        for bad in [
            "",
            "1.2.3",
            "1.2.3.4.5",
            "256.1.1.1",
            "1.2.3.256",
            "a.b.c.d",
            "1.2.3.",
            ".1.2.3",
            "1..2.3",
        ] {
            assert!(parse_ipv4("src", bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_parse_ipv4_rejects_non_canonical() {
        for bad in ["01.2.3.4", "1.2.3.04", "1.2.3.+4", "1.2.3. 4", "1.2.3.0x4"] {
            assert!(parse_ipv4("src", bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_parse_ipv4_error_names_field() {
        match parse_ipv4("dest_ip", "300.1.1.1") {
            Err(Error::InvalidAddress { field, value }) => {
                assert_eq!(field, "dest_ip");
                assert_eq!(value, "300.1.1.1");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_port_valid() {
        assert_eq!(parse_port("src", "1").unwrap(), 1);
        assert_eq!(parse_port("src", "80").unwrap(), 80);
        assert_eq!(parse_port("src", "65535").unwrap(), 65535);
    }

    #[test]
    fn test_parse_port_rejects_invalid() {
        for bad in ["0", "65536", "99999", "", "-1", "+80", "080", "8o"] {
            assert!(parse_port("src", bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new(Ipv4Addr::new(203, 0, 113, 5), 50000);
        assert_eq!(ep.to_string(), "203.0.113.5:50000");
    }
}

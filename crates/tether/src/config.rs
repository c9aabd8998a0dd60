//! Endpoint configuration.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{ErrorKind, SocketError};

/// The address an endpoint connects to or listens on.
///
/// Immutable once the worker starts. The transport is IPv4-only; addresses
/// are dotted quads, not hostnames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    address: Ipv4Addr,
    port: u16,
}

impl EndpointConfig {
    /// Parses a dotted-quad address and port.
    pub fn parse(address: &str, port: u16) -> Result<Self, SocketError> {
        let address = address.parse::<Ipv4Addr>().map_err(|_| {
            SocketError::new(
                ErrorKind::InvalidArgument,
                format!("not an IPv4 dotted quad: {address}"),
            )
        })?;
        Ok(Self { address, port })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The full socket address.
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn parses_dotted_quad() {
        let config = EndpointConfig::parse("127.0.0.1", 7777).expect("valid address");
        assert_eq!(config.address(), Ipv4Addr::LOCALHOST);
        assert_eq!(config.port(), 7777);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:7777");
    }

    #[test]
    fn rejects_hostnames_and_ipv6() {
        for bad in ["localhost", "::1", "example.com", ""] {
            let err = EndpointConfig::parse(bad, 7777).expect_err("must reject");
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }
}

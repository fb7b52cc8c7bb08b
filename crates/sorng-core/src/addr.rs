// ── SSH address helpers ──────────────────────────────────────────────────────

use crate::error::AddrError;
use crate::ip::is_ipv4;

/// Separator between host and port in a connection address.
pub const ADDR_SEPARATOR: char = ':';

/// Port appended when an address carries none.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// The only host name accepted besides IPv4 literals.
pub const LOCALHOST: &str = "localhost";

/// Validate a `host[:port]` address and return it in `host:port` form.
///
/// The host must be `localhost` or an IPv4 literal. A missing port is
/// filled with [`DEFAULT_SSH_PORT`]; a present one must fit in a `u16`.
/// Normalising an already normalised address returns it unchanged.
pub fn normalize_address(addr: &str) -> Result<String, AddrError> {
    if addr.is_empty() {
        return Err(AddrError::Empty);
    }

    let (host, port) = match addr.split_once(ADDR_SEPARATOR) {
        Some((host, port)) => (host, Some(port)),
        None => (addr, None),
    };

    if host != LOCALHOST && !is_ipv4(host) {
        return Err(AddrError::InvalidHost(host.to_string()));
    }

    match port {
        None => Ok(format!("{}{}{}", addr, ADDR_SEPARATOR, DEFAULT_SSH_PORT)),
        Some(port) => {
            port.parse::<u16>()
                .map_err(|_| AddrError::InvalidPort(port.to_string()))?;
            Ok(addr.to_string())
        }
    }
}

/// Host part of an address (everything before the first separator).
pub fn host_of(addr: &str) -> &str {
    addr.split(ADDR_SEPARATOR).next().unwrap_or(addr)
}

/// Port of an address, [`DEFAULT_SSH_PORT`] when absent or unparsable.
pub fn port_of(addr: &str) -> u16 {
    addr.split_once(ADDR_SEPARATOR)
        .and_then(|(_, port)| port.parse().ok())
        .unwrap_or(DEFAULT_SSH_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_appends_default_port() {
        assert_eq!(normalize_address("192.168.10.100").unwrap(), "192.168.10.100:22");
        assert_eq!(normalize_address("localhost").unwrap(), "localhost:22");
    }

    #[test]
    fn test_normalize_keeps_explicit_port() {
        assert_eq!(normalize_address("10.0.0.1:2222").unwrap(), "10.0.0.1:2222");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in ["127.0.0.1", "localhost:22", "172.31.54.6:8022", "0.0.0.0"] {
            let once = normalize_address(input).unwrap();
            let twice = normalize_address(&once).unwrap();
            assert_eq!(once, twice);
            assert_eq!(once.matches(ADDR_SEPARATOR).count(), 1);
        }
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert_eq!(normalize_address(""), Err(AddrError::Empty));
    }

    #[test]
    fn test_normalize_rejects_bad_hosts() {
        for input in ["256.1.1.1", "1.2.3", "example.com", "::1", "10.0.0.1.5:22", " 127.0.0.1"] {
            assert!(
                matches!(normalize_address(input), Err(AddrError::InvalidHost(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_normalize_rejects_bad_port() {
        assert_eq!(
            normalize_address("10.0.0.1:ssh"),
            Err(AddrError::InvalidPort("ssh".into()))
        );
        assert!(normalize_address("10.0.0.1:70000").is_err());
        assert!(normalize_address("10.0.0.1:").is_err());
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("127.0.0.1:22"), "127.0.0.1");
        assert_eq!(host_of("localhost"), "localhost");
        assert_eq!(host_of(""), "");
    }

    #[test]
    fn test_port_of() {
        assert_eq!(port_of("10.0.0.1:2222"), 2222);
        assert_eq!(port_of("10.0.0.1"), DEFAULT_SSH_PORT);
        assert_eq!(port_of("10.0.0.1:x"), DEFAULT_SSH_PORT);
    }
}

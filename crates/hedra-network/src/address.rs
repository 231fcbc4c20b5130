use hedra_common::{HedraError, Result};
use std::fmt;
use std::str::FromStr;

/// Plaintext/TLS port pairs used by this network.
///
/// Consensus nodes listen on 50211 (plaintext) and 50212 (TLS); mirror nodes
/// on 5600 (plaintext) and 443 (TLS).
pub const PORT_PAIRS: [(u16, u16); 2] = [(50211, 50212), (5600, 443)];

/// Port assumed when an endpoint is given without one.
pub const DEFAULT_PORT: u16 = 443;

/// A `host:port` endpoint. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeAddress {
    host: String,
    port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into().trim().to_ascii_lowercase();
        if host.is_empty() || host.contains(char::is_whitespace) || host.contains('/') {
            return Err(HedraError::InvalidAddress(format!("invalid host `{}`", host)));
        }
        Ok(Self { host, port })
    }

    /// Builds an address from trusted parts without validation.
    pub(crate) fn from_static(host: &'static str, port: u16) -> Self {
        Self { host: host.to_string(), port }
    }

    /// Parses `host:port` or a bare `host` (port [`DEFAULT_PORT`]).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    HedraError::InvalidAddress(format!("invalid port in `{}`", s))
                })?;
                Self::new(host, port)
            }
            None => Self::new(s, DEFAULT_PORT),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        PORT_PAIRS.iter().any(|(_, tls)| *tls == self.port)
    }

    pub fn is_plaintext(&self) -> bool {
        PORT_PAIRS.iter().any(|(plain, _)| *plain == self.port)
    }

    /// The TLS counterpart of this address; unchanged if the port is not a
    /// known plaintext port.
    pub fn to_secure(&self) -> Self {
        let port = PORT_PAIRS
            .iter()
            .find(|(plain, _)| *plain == self.port)
            .map(|(_, tls)| *tls)
            .unwrap_or(self.port);
        Self { host: self.host.clone(), port }
    }

    /// The plaintext counterpart of this address; unchanged if the port is
    /// not a known TLS port.
    pub fn to_insecure(&self) -> Self {
        let port = PORT_PAIRS
            .iter()
            .find(|(_, tls)| *tls == self.port)
            .map(|(plain, _)| *plain)
            .unwrap_or(self.port);
        Self { host: self.host.clone(), port }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = HedraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_and_port() {
        let addr = NodeAddress::parse("0.testnet.hedera.com:50211").unwrap();
        assert_eq!(addr.host(), "0.testnet.hedera.com");
        assert_eq!(addr.port(), 50211);
        assert_eq!(addr.to_string(), "0.testnet.hedera.com:50211");
    }

    #[test]
    fn test_parse_normalizes_host() {
        let addr = NodeAddress::parse("  Node.Example.COM:5600 ").unwrap();
        assert_eq!(addr.host(), "node.example.com");
    }

    #[test]
    fn test_parse_defaults_port() {
        let addr = NodeAddress::parse("mainnet-public.mirrornode.hedera.com").unwrap();
        assert_eq!(addr.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(NodeAddress::parse(":50211").is_err());
        assert!(NodeAddress::parse("host:notaport").is_err());
        assert!(NodeAddress::parse("host:70000").is_err());
        assert!(NodeAddress::parse("").is_err());
    }

    #[test]
    fn test_secure_insecure_pairs() {
        let plain = NodeAddress::parse("10.0.0.1:50211").unwrap();
        let secure = plain.to_secure();
        assert_eq!(secure.port(), 50212);
        assert!(secure.is_secure());
        assert_eq!(secure.to_insecure(), plain);

        let mirror = NodeAddress::parse("mirror:5600").unwrap();
        assert_eq!(mirror.to_secure().port(), 443);
    }

    #[test]
    fn test_conversions_are_idempotent() {
        let plain = NodeAddress::parse("10.0.0.1:50211").unwrap();
        assert_eq!(plain.to_insecure(), plain);
        assert_eq!(plain.to_secure().to_secure(), plain.to_secure());
    }

    #[test]
    fn test_unknown_port_is_untouched() {
        let other = NodeAddress::parse("10.0.0.1:8080").unwrap();
        assert_eq!(other.to_secure(), other);
        assert_eq!(other.to_insecure(), other);
        assert!(!other.is_secure());
        assert!(!other.is_plaintext());
    }
}

//! Station endpoint configuration.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use tokio::net::lookup_host;
use tracing::debug;

use crate::error::{Result, Z21Error};

/// Default UDP port of a Z21 command station.
pub const DEFAULT_PORT: u16 = 21105;

/// Host and port of a Z21 station, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationAddr {
    pub host: String,
    pub port: u16,
}

impl StationAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn validate_host(host: &str) -> bool {
        !host.is_empty()
            && host.len() <= 253
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
            && !host.starts_with('.')
            && !host.ends_with('.')
            && !host.contains("..")
    }

    /// Resolve to the first IPv4 endpoint of the station.
    pub(crate) async fn resolve(&self) -> Result<SocketAddr> {
        debug!(host = %self.host, port = self.port, "resolving station address");
        let candidates = lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| Z21Error::AddressResolution(format!("{self}: {e}")))?;
        candidates
            .into_iter()
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| Z21Error::AddressResolution(format!("{self}: no IPv4 address found")))
    }
}

impl fmt::Display for StationAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for StationAddr {
    type Err = String;

    /// Parses `host` or `host:port`; the port defaults to 21105.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| "invalid port number".to_string())?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };

        if !Self::validate_host(host) {
            return Err("invalid host name".to_string());
        }

        Ok(StationAddr::new(host, port))
    }
}

//! Server endpoint remembered for reconnect attempts.

use std::fmt;
use std::net::IpAddr;

/// Port used when an address string does not name one.
pub const DEFAULT_SERVER_PORT: u16 = 25565;

/// Where to reconnect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A resolvable host (DNS name or IP literal) plus port.
    Address {
        /// Host name or IP literal, without brackets.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// An opaque server-list entry owned by the host application.
    Named(String),
}

/// Failure to parse an address string into an [`Endpoint`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    /// The string was empty or only whitespace.
    #[error("server address is empty")]
    Empty,
    /// The part after the last `:` is not a valid port.
    #[error("invalid port in server address: {0}")]
    InvalidPort(String),
    /// A bracketed IPv6 literal was not closed.
    #[error("unterminated IPv6 literal in server address: {0}")]
    UnterminatedBracket(String),
}

impl Endpoint {
    /// Create an address endpoint.
    pub fn address(host: impl Into<String>, port: u16) -> Self {
        Self::Address {
            host: host.into(),
            port,
        }
    }

    /// Parse `host`, `host:port`, `[v6]`, `[v6]:port`, or a bare IPv6 literal.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, EndpointParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EndpointParseError::Empty);
        }

        if let Some(rest) = input.strip_prefix('[') {
            let Some((host, tail)) = rest.split_once(']') else {
                return Err(EndpointParseError::UnterminatedBracket(input.to_string()));
            };
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None if tail.is_empty() => default_port,
                None => return Err(EndpointParseError::InvalidPort(tail.to_string())),
            };
            return Ok(Self::address(host, port));
        }

        // Two or more colons without brackets can only be a bare IPv6 literal.
        if input.parse::<IpAddr>().is_ok() {
            return Ok(Self::address(input, default_port));
        }

        match input.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => Ok(Self::address(host, parse_port(port)?)),
            Some((_, _)) => Err(EndpointParseError::Empty),
            None => Ok(Self::address(input, default_port)),
        }
    }
}

fn parse_port(text: &str) -> Result<u16, EndpointParseError> {
    text.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| EndpointParseError::InvalidPort(text.to_string()))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Address { host, port } => write!(f, "{host}:{port}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

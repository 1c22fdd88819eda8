//! Remote endpoint parsing.
//!
//! Accepted forms:
//!
//! | Scheme | Protocol | Transport |
//! |--------|----------|-----------|
//! | `grpc://host[:port]` | gRPC | plaintext |
//! | `grpcs://host[:port]` | gRPC | TLS |
//! | `http://host[:port]` | HTTP | plaintext |
//! | `https://host[:port]` | HTTP | TLS |
//!
//! Anything else is rejected before a connection is attempted.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::EndpointError;

/// Wire protocol spoken to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Grpc,
    Http,
}

/// A validated `scheme://host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub secure: bool,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let invalid = |reason: &str| EndpointError::InvalidEndpoint {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("endpoint is empty"));
        }
        if !trimmed.contains("://") {
            return Err(invalid("missing scheme"));
        }

        let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;

        let (protocol, secure) = match url.scheme() {
            "grpc" => (Protocol::Grpc, false),
            "grpcs" => (Protocol::Grpc, true),
            "http" => (Protocol::Http, false),
            "https" => (Protocol::Http, true),
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => return Err(invalid("missing host")),
        };
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("user info is not allowed"));
        }
        if !(url.path().is_empty() || url.path() == "/") {
            return Err(invalid("path is not allowed"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed"));
        }

        let port = url
            .port()
            .unwrap_or(if secure { 443 } else { 80 });
        if port == 0 {
            return Err(invalid("port 0 is not dialable"));
        }

        Ok(Self {
            protocol,
            secure,
            host,
            port,
        })
    }

    /// `http(s)://host:port` form used to dial, regardless of protocol.
    pub fn origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Host name without IPv6 brackets, for TLS server name checks.
    pub fn server_name(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match (self.protocol, self.secure) {
            (Protocol::Grpc, false) => "grpc",
            (Protocol::Grpc, true) => "grpcs",
            (Protocol::Http, false) => "http",
            (Protocol::Http, true) => "https",
        };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

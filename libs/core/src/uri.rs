use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

/// Channel address
///
/// The scheme selects the provider; everything after it is opaque to the
/// registry and interpreted by the provider alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(Url);

impl Uri {
    pub fn parse(raw: &str) -> Result<Self> {
        Url::parse(raw).map(Self).map_err(|source| Error::InvalidUri {
            uri: raw.to_string(),
            source,
        })
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    pub fn port(&self) -> Option<u16> {
        self.0.port()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// `host:port` for socket-style schemes
    pub fn authority(&self) -> Option<String> {
        let host = self.host()?;
        Some(match self.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_uri_exposes_scheme_and_host() {
        let uri: Uri = "mem://x".parse().unwrap();
        assert_eq!(uri.scheme(), "mem");
        assert_eq!(uri.host(), Some("x"));
    }

    #[test]
    fn tcp_uri_authority_includes_port() {
        let uri = Uri::parse("tcp://127.0.0.1:4000").unwrap();
        assert_eq!(uri.authority().as_deref(), Some("127.0.0.1:4000"));
    }

    #[test]
    fn unix_uri_keeps_path() {
        let uri = Uri::parse("unix:///tmp/courier.sock").unwrap();
        assert_eq!(uri.scheme(), "unix");
        assert_eq!(uri.path(), "/tmp/courier.sock");
    }

    #[test]
    fn rejects_relative_uri() {
        match Uri::parse("no-scheme-here") {
            Err(Error::InvalidUri { uri, .. }) => assert_eq!(uri, "no-scheme-here"),
            other => panic!("expected InvalidUri, got {:?}", other),
        }
    }
}

//! Registry of peer nodes.
//!
//! Peers are identified by host and port only. Scheme, path and query of a
//! registered address are dropped before the membership test.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),
}

/// Network location of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

impl PeerAddr {
    /// Parse a peer address such as `http://10.0.0.5:5000/` or `10.0.0.5:5000`.
    ///
    /// Addresses without a scheme are read as `http://`. A missing port falls
    /// back to the scheme's default.
    pub fn parse(address: &str) -> Result<Self, PeerError> {
        let address = address.trim();
        let invalid = || PeerError::InvalidAddress(address.to_string());

        let parsed = if address.contains("://") {
            Url::parse(address)
        } else {
            Url::parse(&format!("http://{}", address))
        }
        .map_err(|_| invalid())?;

        let host = parsed.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let port = parsed.port_or_known_default().ok_or_else(invalid)?;
        Ok(PeerAddr {
            host: host.to_string(),
            port,
        })
    }

    /// Base URL for requests to this peer.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerAddr {
    type Err = PeerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PeerAddr::parse(s)
    }
}

// Peers travel as their `host:port` text.
impl Serialize for PeerAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PeerAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        PeerAddr::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Set of known peers.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: BTreeSet<PeerAddr>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer. Registering the same host and port again is a no-op.
    pub fn register(&mut self, address: &str) -> Result<PeerAddr, PeerError> {
        let peer = PeerAddr::parse(address)?;
        self.peers.insert(peer.clone());
        Ok(peer)
    }

    /// Register every address in order, stopping at the first malformed one.
    ///
    /// Addresses before the failing one stay registered.
    pub fn register_all<I, A>(&mut self, addresses: I) -> Result<usize, PeerError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let mut registered = 0;
        for address in addresses {
            self.register(address.as_ref())?;
            registered += 1;
        }
        Ok(registered)
    }

    pub fn members(&self) -> Vec<PeerAddr> {
        self.peers.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

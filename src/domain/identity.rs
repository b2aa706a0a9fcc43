//! Client identity used as the rate limiter key.
//!
//! Where the identity comes from depends on the deployment: behind a reverse
//! proxy the socket address is the proxy's own, so the hop that proxy
//! appended to `X-Forwarded-For` must be used instead. That choice is
//! configuration ([`IdentitySource`]), never a guess made per request.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Where to read the client address from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentitySource {
    /// Use the peer address of the TCP connection
    #[default]
    PeerAddress,
    /// Trust one reverse proxy: use the last hop of `X-Forwarded-For`, falling back to the peer
    ///
    /// Earlier hops are supplied by the client and are never used.
    ForwardedFor,
}

/// Identity of a caller for rate limiting purposes.
///
/// Not persisted anywhere beyond the limiter window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClientIdentity {
    /// A resolved network address
    Addr(IpAddr),
    /// No usable address was available; all such callers share one bucket
    Unknown,
}

impl ClientIdentity {
    /// Derive the identity for a request.
    ///
    /// # Arguments
    /// * `source` - Configured identity source
    /// * `peer` - Peer address of the connection, if known
    /// * `forwarded_for` - Raw `X-Forwarded-For` header value, if present
    pub fn derive(source: IdentitySource, peer: Option<IpAddr>, forwarded_for: Option<&str>) -> Self {
        let forwarded = match source {
            IdentitySource::PeerAddress => None,
            IdentitySource::ForwardedFor => forwarded_for.and_then(proxy_appended_hop),
        };

        forwarded
            .or(peer)
            .map(ClientIdentity::Addr)
            .unwrap_or(ClientIdentity::Unknown)
    }
}

fn proxy_appended_hop(header: &str) -> Option<IpAddr> {
    header
        .rsplit(',')
        .next()
        .map(str::trim)
        .and_then(|hop| IpAddr::from_str(hop).ok())
}

impl From<IpAddr> for ClientIdentity {
    fn from(addr: IpAddr) -> Self {
        ClientIdentity::Addr(addr)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdentity::Addr(addr) => write!(f, "{addr}"),
            ClientIdentity::Unknown => write!(f, "unknown"),
        }
    }
}

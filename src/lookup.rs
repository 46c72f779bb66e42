use std::io;
use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("lookup of {host} failed: {source}")]
    Io {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("lookup of {0} timed out")]
    Timeout(String),
}

/// Forward resolution of host names the local table does not know.
///
/// Implementations are best effort: they may fail or be slow, and an empty
/// list is a valid answer.
#[async_trait]
pub trait ForwardLookup: Send + Sync {
    /// Resolves `host` (no trailing root separator) to its IPv4 addresses in
    /// the order the resolver returned them.
    async fn lookup(&self, host: &str) -> Result<Vec<Ipv4Addr>, LookupError>;
}

/// Lookup through the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

#[async_trait]
impl ForwardLookup for SystemLookup {
    async fn lookup(&self, host: &str) -> Result<Vec<Ipv4Addr>, LookupError> {
        trace!("resolving {} with the system resolver", host);

        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|source| LookupError::Io {
                host: host.to_owned(),
                source,
            })?;

        Ok(addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .collect())
    }
}

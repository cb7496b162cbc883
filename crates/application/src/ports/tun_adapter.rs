use super::{DnsResolver, ResolverEnhancer};
use std::sync::Arc;
use tundns_domain::TunDnsError;

/// State of a tun interface as seen by the rest of the system.
pub trait TunAdapter: Send + Sync {
    fn close(&self);

    fn device_url(&self) -> String;

    /// Creates, replaces or disables the DNS server on the tun device.
    fn recreate_dns_server(&self, addr: &str) -> Result<(), TunDnsError>;

    /// Sets the resolver serving DNS requests on the tun device.
    fn reset_dns_resolver(
        &self,
        resolver: Option<Arc<dyn DnsResolver>>,
        mapper: Option<Arc<dyn ResolverEnhancer>>,
    ) -> Result<(), TunDnsError>;

    /// Current listening address of the DNS server, empty when disabled.
    fn dns_listen(&self) -> String;
}

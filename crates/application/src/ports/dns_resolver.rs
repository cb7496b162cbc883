use async_trait::async_trait;
use hickory_proto::op::Message;
use std::net::{IpAddr, Ipv4Addr};
use tundns_domain::TunDnsError;

/// Upstream resolution, including whatever caching and strategy the
/// resolver applies.
#[async_trait]
pub trait DnsResolver: Send + Sync {
    async fn exchange(&self, request: &Message) -> Result<Message, TunDnsError>;
}

/// Membership test for synthetic (fake) addresses.
pub trait FakeIpMatcher: Send + Sync {
    fn is_fake_ip(&self, ip: IpAddr) -> bool;
}

/// Fake-IP allocation and ip → host mapping layered over a resolver.
pub trait ResolverEnhancer: Send + Sync {
    fn fake_ip_enabled(&self) -> bool;

    fn mapping_enabled(&self) -> bool;

    /// Hosts excluded from fake-IP answers and resolved normally.
    fn should_skip(&self, _host: &str) -> bool {
        false
    }

    /// Allocates (or looks up) the fake address for `host`.
    fn fake_ip_for(&self, host: &str) -> Option<Ipv4Addr>;

    fn insert_mapping(&self, ip: IpAddr, host: &str, ttl: u32);

    fn is_fake_ip(&self, ip: IpAddr) -> bool;
}

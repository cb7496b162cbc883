mod dns_resolver;
mod net_stack;
mod response_writer;
mod transport_endpoint;
mod tun_adapter;
mod udp_packet;

pub use dns_resolver::{DnsResolver, FakeIpMatcher, ResolverEnhancer};
pub use net_stack::{NetStack, Route, StackListener, StackStream};
pub use response_writer::ResponseWriter;
pub use transport_endpoint::TransportEndpoint;
pub use tun_adapter::TunAdapter;
pub use udp_packet::UdpPacket;

//! DNS interception on a tun device backed by a user-space stack.

pub mod adapter;
pub mod dns_endpoint;
pub mod dns_server;
pub mod flow;
pub mod redirect;
pub mod response_writer;

pub use adapter::NetstackTunAdapter;
pub use dns_endpoint::DnsUdpEndpoint;
pub use dns_server::{DnsServerOptions, TunDnsServer};
pub use flow::UdpFlow;
pub use redirect::UdpRedirectEndpoint;
pub use response_writer::DnsResponseWriter;

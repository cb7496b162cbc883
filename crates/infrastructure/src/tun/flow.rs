use crate::netstack::write_udp;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tundns_application::ports::{FakeIpMatcher, NetStack, UdpPacket};
use tundns_domain::{EndpointId, NetworkProtocol, NicId, PacketBuffer, TunDnsError};

/// A UDP datagram intercepted on the tun, handed to the redirect path.
///
/// Replies normally leave from whatever address the redirect path names, so
/// they look like they came from the real server. Datagrams sent to a
/// fake-IP address always reply from that fake address instead.
pub struct UdpFlow {
    stack: Arc<dyn NetStack>,
    id: EndpointId,
    nic_id: NicId,
    network_protocol: NetworkProtocol,
    payload: Bytes,
    fake_ip_matcher: Arc<dyn FakeIpMatcher>,
    fake_ip: OnceLock<bool>,
}

impl UdpFlow {
    pub fn new(
        stack: Arc<dyn NetStack>,
        id: EndpointId,
        packet: &PacketBuffer,
        fake_ip_matcher: Arc<dyn FakeIpMatcher>,
    ) -> Self {
        Self {
            stack,
            id,
            nic_id: packet.nic_id,
            network_protocol: packet.network_protocol,
            payload: packet.data_bytes(),
            fake_ip_matcher,
            fake_ip: OnceLock::new(),
        }
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.id
    }

    /// Whether the datagram was addressed to a fake IP. Evaluated once.
    pub fn fake_ip(&self) -> bool {
        *self.fake_ip.get_or_init(|| {
            self.id
                .local_address
                .is_some_and(|ip| self.fake_ip_matcher.is_fake_ip(ip))
        })
    }

    /// Original destination of the datagram.
    pub fn target_addr(&self) -> SocketAddr {
        self.id.local_socket_addr()
    }
}

impl UdpPacket for UdpFlow {
    fn data(&self) -> &[u8] {
        &self.payload
    }

    fn write_back(&self, bytes: &[u8], addr: Option<SocketAddr>) -> Result<usize, TunDnsError> {
        let fake_ip = self.fake_ip();
        let (local, local_port) = match addr {
            Some(addr) if !fake_ip => (self.network_protocol.narrow(addr.ip()), addr.port()),
            _ => (self.target_addr().ip(), self.id.local_port),
        };
        let remote = self.id.remote_socket_addr();

        let route = self
            .stack
            .find_route(self.nic_id, local, remote.ip(), self.network_protocol)
            .map_err(TunDnsError::Route)?;
        write_udp(route.as_ref(), bytes, local_port, remote.port())
    }

    fn drop_packet(&self) {}

    // The sending application is the remote end of the stack's tuple.
    fn local_addr(&self) -> SocketAddr {
        self.id.remote_socket_addr()
    }
}

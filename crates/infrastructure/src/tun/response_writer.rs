use crate::netstack::write_udp;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tundns_application::ports::{NetStack, ResponseWriter};
use tundns_domain::{EndpointId, NetworkProtocol, NicId, PacketBuffer, TunDnsError};

/// Replies to one UDP DNS request received on the tun.
///
/// `id` is the request's tuple as the stack saw it, so the reply goes from
/// its local end (the address the client queried) to its remote end.
pub struct DnsResponseWriter {
    stack: Arc<dyn NetStack>,
    nic_id: NicId,
    network_protocol: NetworkProtocol,
    id: EndpointId,
}

impl DnsResponseWriter {
    pub fn new(stack: Arc<dyn NetStack>, id: EndpointId, packet: &PacketBuffer) -> Self {
        Self {
            stack,
            nic_id: packet.nic_id,
            network_protocol: packet.network_protocol,
            id,
        }
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.id
    }
}

#[async_trait]
impl ResponseWriter for DnsResponseWriter {
    fn local_addr(&self) -> SocketAddr {
        self.id.local_socket_addr()
    }

    fn remote_addr(&self) -> SocketAddr {
        self.id.remote_socket_addr()
    }

    async fn write(&self, bytes: &[u8]) -> Result<usize, TunDnsError> {
        let local = self.local_addr();
        let remote = self.remote_addr();
        let route = self
            .stack
            .find_route(self.nic_id, local.ip(), remote.ip(), self.network_protocol)
            .map_err(TunDnsError::Route)?;
        write_udp(route.as_ref(), bytes, local.port(), remote.port())
    }
}

use super::TransportEndpoint;
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tundns_domain::{
    EndpointId, FullAddress, NetworkHeaderParams, NetworkProtocol, NicId, OutboundPacket,
    PortFlags, ProtocolAddress, StackError, Stats, TransportProtocol,
};

/// The user-space network stack the tun device feeds.
pub trait NetStack: Send + Sync {
    /// A fresh identifier, unique for the lifetime of the stack.
    fn unique_id(&self) -> u64;

    fn stats(&self) -> &Stats;

    fn add_protocol_address(&self, nic: NicId, address: ProtocolAddress)
        -> Result<(), StackError>;

    fn register_transport_endpoint(
        &self,
        network_protocols: &[NetworkProtocol],
        transport: TransportProtocol,
        id: EndpointId,
        endpoint: Arc<dyn TransportEndpoint>,
        flags: PortFlags,
        nic: NicId,
    ) -> Result<(), StackError>;

    /// Must be called with the protocol set and flags used at registration.
    fn unregister_transport_endpoint(
        &self,
        network_protocols: &[NetworkProtocol],
        transport: TransportProtocol,
        id: EndpointId,
        endpoint: &Arc<dyn TransportEndpoint>,
        flags: PortFlags,
        nic: NicId,
    );

    fn find_route(
        &self,
        nic: NicId,
        local: IpAddr,
        remote: IpAddr,
        protocol: NetworkProtocol,
    ) -> Result<Arc<dyn Route>, StackError>;

    fn listen_tcp(
        &self,
        address: FullAddress,
        protocol: NetworkProtocol,
    ) -> Result<Arc<dyn StackListener>, StackError>;
}

/// A resolved route: everything needed to put one packet on the wire.
pub trait Route: Send + Sync {
    fn nic_id(&self) -> NicId;

    fn local_address(&self) -> IpAddr;

    fn remote_address(&self) -> IpAddr;

    fn network_protocol(&self) -> NetworkProtocol;

    /// Headroom the network and link layers need in front of the transport
    /// header.
    fn max_header_length(&self) -> usize;

    /// False when the NIC offloads transport checksums.
    fn requires_tx_transport_checksum(&self) -> bool;

    /// Partial (not complemented) checksum of the pseudo-header.
    fn pseudo_header_checksum(&self, protocol: TransportProtocol, total_len: u16) -> u16;

    fn default_ttl(&self) -> u8;

    fn write_packet(
        &self,
        params: NetworkHeaderParams,
        packet: OutboundPacket,
    ) -> Result<(), StackError>;

    fn stats(&self) -> &Stats;
}

pub trait StackStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> StackStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A TCP listener opened through the stack rather than the host kernel.
#[async_trait]
pub trait StackListener: Send + Sync {
    async fn accept(&self) -> Result<(Box<dyn StackStream>, SocketAddr), StackError>;

    fn local_addr(&self) -> FullAddress;

    /// Stops accepting; pending and future `accept` calls fail with
    /// `StackError::Closed`.
    fn close(&self);
}

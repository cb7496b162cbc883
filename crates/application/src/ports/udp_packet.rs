use std::net::SocketAddr;
use tundns_domain::TunDnsError;

/// One intercepted UDP datagram handed to the redirect path.
pub trait UdpPacket: Send + Sync {
    fn data(&self) -> &[u8];

    /// Replies to the sender. `addr` is the address the reply should appear
    /// to come from; `None` means the original destination.
    fn write_back(&self, bytes: &[u8], addr: Option<SocketAddr>) -> Result<usize, TunDnsError>;

    /// Releases the packet without replying.
    fn drop_packet(&self);

    /// Address of the application that sent the packet.
    fn local_addr(&self) -> SocketAddr;

    fn close(&self) -> Result<(), TunDnsError> {
        Ok(())
    }
}

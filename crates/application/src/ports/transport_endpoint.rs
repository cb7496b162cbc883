use tundns_domain::{EndpointId, PacketBuffer, TransportError};

/// A protocol handler registered directly with the stack.
///
/// `handle_packet` runs on the stack's dispatch loop and must not block.
pub trait TransportEndpoint: Send + Sync {
    fn unique_id(&self) -> u64;

    fn handle_packet(&self, id: EndpointId, packet: &PacketBuffer);

    fn handle_error(&self, error: TransportError, packet: &PacketBuffer);

    fn close(&self);

    fn wait(&self);

    fn abort(&self) {
        self.close();
    }
}

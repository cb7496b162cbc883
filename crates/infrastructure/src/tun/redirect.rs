use super::flow::UdpFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use tundns_application::ports::{FakeIpMatcher, NetStack, TransportEndpoint};
use tundns_domain::{EndpointId, PacketBuffer, TransportError};

/// Turns every datagram it receives into a [`UdpFlow`] and queues it for
/// the redirect path. Datagrams arriving while the queue is full are dropped
/// and counted.
pub struct UdpRedirectEndpoint {
    stack: Arc<dyn NetStack>,
    unique_id: u64,
    fake_ip_matcher: Arc<dyn FakeIpMatcher>,
    flows: mpsc::Sender<UdpFlow>,
}

impl UdpRedirectEndpoint {
    pub fn new(
        stack: Arc<dyn NetStack>,
        fake_ip_matcher: Arc<dyn FakeIpMatcher>,
        queue_size: usize,
    ) -> (Self, mpsc::Receiver<UdpFlow>) {
        let (flows, rx) = mpsc::channel(queue_size);
        let unique_id = stack.unique_id();
        (
            Self {
                stack,
                unique_id,
                fake_ip_matcher,
                flows,
            },
            rx,
        )
    }
}

impl TransportEndpoint for UdpRedirectEndpoint {
    fn unique_id(&self) -> u64 {
        self.unique_id
    }

    fn handle_packet(&self, id: EndpointId, packet: &PacketBuffer) {
        let flow = UdpFlow::new(
            Arc::clone(&self.stack),
            id,
            packet,
            Arc::clone(&self.fake_ip_matcher),
        );
        if let Err(e) = self.flows.try_send(flow) {
            self.stack.stats().udp.receive_buffer_errors.increment();
            debug!(error = %e, client = %id.remote_socket_addr(), "Dropping redirected datagram");
        }
    }

    fn handle_error(&self, error: TransportError, _packet: &PacketBuffer) {
        debug!(error = %error, endpoint = self.unique_id, "Redirect endpoint transport error");
    }

    fn close(&self) {}

    fn wait(&self) {}
}

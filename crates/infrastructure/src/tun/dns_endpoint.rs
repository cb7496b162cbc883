use super::response_writer::DnsResponseWriter;
use crate::dns::DnsService;
use crate::netstack::udp_header::{UdpHeader, UDP_MINIMUM_SIZE};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use tundns_application::dns_message;
use tundns_application::ports::{NetStack, TransportEndpoint};
use tundns_domain::{EndpointId, PacketBuffer, TransportError};

/// UDP endpoint registered on the stack at the DNS listen address.
///
/// Each valid datagram is decoded and answered on the runtime by whichever
/// [`DnsService`] is installed at that moment; without one, datagrams are
/// dropped.
pub struct DnsUdpEndpoint {
    stack: Arc<dyn NetStack>,
    unique_id: u64,
    service: ArcSwapOption<DnsService>,
    runtime: Handle,
    inflight: Arc<Semaphore>,
}

impl DnsUdpEndpoint {
    pub fn new(stack: Arc<dyn NetStack>, runtime: Handle, max_inflight_queries: usize) -> Self {
        let unique_id = stack.unique_id();
        Self {
            stack,
            unique_id,
            service: ArcSwapOption::empty(),
            runtime,
            inflight: Arc::new(Semaphore::new(max_inflight_queries.max(1))),
        }
    }

    /// Installs or clears the service answering requests. Takes effect for
    /// the next datagram.
    pub fn set_service(&self, service: Option<Arc<DnsService>>) {
        self.service.store(service);
    }
}

impl TransportEndpoint for DnsUdpEndpoint {
    fn unique_id(&self) -> u64 {
        self.unique_id
    }

    fn handle_packet(&self, id: EndpointId, packet: &PacketBuffer) {
        let stats = &self.stack.stats().udp;

        let header = UdpHeader(packet.transport_header());
        if !header.is_complete()
            || usize::from(header.length()) > packet.data_size() + UDP_MINIMUM_SIZE
        {
            stats.malformed_packets_received.increment();
            return;
        }

        let Some(service) = self.service.load_full() else {
            return;
        };

        let request = match dns_message::unpack(packet.data()) {
            Ok(request) => request,
            Err(e) => {
                debug!(
                    error = %e,
                    client = %id.remote_socket_addr(),
                    "Dropping undecodable DNS request"
                );
                return;
            }
        };

        let Ok(permit) = Arc::clone(&self.inflight).try_acquire_owned() else {
            stats.receive_buffer_errors.increment();
            debug!(client = %id.remote_socket_addr(), "Too many DNS requests in flight, dropping");
            return;
        };

        let writer = Arc::new(DnsResponseWriter::new(Arc::clone(&self.stack), id, packet));
        self.runtime.spawn(async move {
            service.serve_dns(writer, request).await;
            drop(permit);
        });
    }

    fn handle_error(&self, error: TransportError, packet: &PacketBuffer) {
        warn!(
            error = %error,
            endpoint = self.unique_id,
            nic = %packet.nic_id,
            "DNS endpoint received transport error"
        );
        debug!(
            endpoint = self.unique_id,
            nic = %packet.nic_id,
            protocol = %packet.network_protocol,
            size = packet.data_size(),
            header = ?packet.transport_header(),
            "Packet carrying the transport error"
        );
    }

    fn close(&self) {}

    fn wait(&self) {}
}

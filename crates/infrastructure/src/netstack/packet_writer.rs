use super::checksum::{checksum, combine};
use super::udp_header::{UdpFields, UdpHeader, UDP_MINIMUM_SIZE};
use tracing::debug;
use tundns_application::ports::Route;
use tundns_domain::{
    NetworkHeaderParams, OutboundPacket, StackError, TransportProtocol, TunDnsError,
};

/// Sends `data` as one UDP datagram `local_port` → `remote_port` along `route`.
///
/// Returns the number of payload bytes written. Updates the route's UDP
/// counters: `packets_sent` on success, `packet_send_errors` on failure.
pub fn write_udp(
    route: &dyn Route,
    data: &[u8],
    local_port: u16,
    remote_port: u16,
) -> Result<usize, TunDnsError> {
    let stats = &route.stats().udp;

    let length = match u16::try_from(UDP_MINIMUM_SIZE + data.len()) {
        Ok(length) => length,
        Err(_) => {
            stats.packet_send_errors.increment();
            return Err(TunDnsError::Send(StackError::MessageTooLong(data.len())));
        }
    };

    // The payload never changes below, so its partial sum can be taken first.
    let payload_sum = route
        .requires_tx_transport_checksum()
        .then(|| checksum(data, 0));

    let mut packet = OutboundPacket::new(UDP_MINIMUM_SIZE + route.max_header_length(), data);
    let mut udp = UdpHeader(packet.push_header(UDP_MINIMUM_SIZE));
    udp.encode(&UdpFields {
        src_port: local_port,
        dst_port: remote_port,
        length,
        checksum: 0,
    });

    if let Some(payload_sum) = payload_sum {
        let xsum = combine(
            route.pseudo_header_checksum(TransportProtocol::Udp, length),
            payload_sum,
        );
        let xsum = !checksum(udp.as_bytes(), xsum);
        // Zero means "no checksum" on the wire.
        udp.set_checksum(if xsum == 0 { 0xffff } else { xsum });
    }

    let params = NetworkHeaderParams {
        protocol: TransportProtocol::Udp,
        ttl: route.default_ttl(),
        tos: 0,
    };
    if let Err(e) = route.write_packet(params, packet) {
        stats.packet_send_errors.increment();
        debug!(
            error = %e,
            local = %route.local_address(),
            remote = %route.remote_address(),
            "UDP write failed"
        );
        return Err(TunDnsError::Send(e));
    }

    stats.packets_sent.increment();
    Ok(data.len())
}

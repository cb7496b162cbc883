use super::Shared;
use crate::netstack::checksum::{checksum, pseudo_header_checksum};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tundns_application::ports::Route;
use tundns_domain::{
    NetworkHeaderParams, NetworkProtocol, NicId, OutboundPacket, StackError, Stats,
    TransportProtocol,
};

pub(super) const IPV4_HEADER_SIZE: usize = 20;
pub(super) const IPV6_HEADER_SIZE: usize = 40;
pub(super) const DEFAULT_TTL: u8 = 64;

static IPV4_IDENT: AtomicU16 = AtomicU16::new(1);

/// A packet the stack put on a NIC's link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub nic: NicId,
    /// Complete IP packet.
    pub packet: Vec<u8>,
}

pub struct MemoryRoute {
    pub(super) nic: NicId,
    pub(super) local: IpAddr,
    pub(super) remote: IpAddr,
    pub(super) protocol: NetworkProtocol,
    pub(super) checksum_offload: bool,
    pub(super) shared: Arc<Shared>,
}

impl MemoryRoute {
    /// Fails with `MessageTooLong` when the length field of the network
    /// header cannot hold the packet.
    fn push_network_header(
        &self,
        params: NetworkHeaderParams,
        packet: &mut OutboundPacket,
    ) -> Result<(), StackError> {
        let payload_len = packet.size();
        match (self.local, self.remote) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                let total_len = u16::try_from(IPV4_HEADER_SIZE + payload_len)
                    .map_err(|_| StackError::MessageTooLong(payload_len))?;
                let ident = IPV4_IDENT.fetch_add(1, Ordering::Relaxed);
                let hdr = packet.push_header(IPV4_HEADER_SIZE);
                hdr[0] = 0x45;
                hdr[1] = params.tos;
                hdr[2..4].copy_from_slice(&total_len.to_be_bytes());
                hdr[4..6].copy_from_slice(&ident.to_be_bytes());
                hdr[6..8].copy_from_slice(&0x4000u16.to_be_bytes());
                hdr[8] = params.ttl;
                hdr[9] = params.protocol.number();
                hdr[12..16].copy_from_slice(&src.octets());
                hdr[16..20].copy_from_slice(&dst.octets());
                let xsum = !checksum(hdr, 0);
                hdr[10..12].copy_from_slice(&xsum.to_be_bytes());
            }
            (src, dst) => {
                let payload_len_field = u16::try_from(payload_len)
                    .map_err(|_| StackError::MessageTooLong(payload_len))?;
                let hdr = packet.push_header(IPV6_HEADER_SIZE);
                hdr[0] = 0x60 | (params.tos >> 4);
                hdr[1] = params.tos << 4;
                hdr[4..6].copy_from_slice(&payload_len_field.to_be_bytes());
                hdr[6] = params.protocol.number();
                hdr[7] = params.ttl;
                hdr[8..24].copy_from_slice(&to_v6(src));
                hdr[24..40].copy_from_slice(&to_v6(dst));
            }
        }
        Ok(())
    }
}

fn to_v6(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

impl Route for MemoryRoute {
    fn nic_id(&self) -> NicId {
        self.nic
    }

    fn local_address(&self) -> IpAddr {
        self.local
    }

    fn remote_address(&self) -> IpAddr {
        self.remote
    }

    fn network_protocol(&self) -> NetworkProtocol {
        self.protocol
    }

    fn max_header_length(&self) -> usize {
        match self.protocol {
            NetworkProtocol::Ipv4 => IPV4_HEADER_SIZE,
            NetworkProtocol::Ipv6 => IPV6_HEADER_SIZE,
        }
    }

    fn requires_tx_transport_checksum(&self) -> bool {
        !self.checksum_offload
    }

    fn pseudo_header_checksum(&self, protocol: TransportProtocol, total_len: u16) -> u16 {
        pseudo_header_checksum(protocol, self.local, self.remote, total_len)
    }

    fn default_ttl(&self) -> u8 {
        DEFAULT_TTL
    }

    fn write_packet(
        &self,
        params: NetworkHeaderParams,
        mut packet: OutboundPacket,
    ) -> Result<(), StackError> {
        if !self.shared.link_up(self.nic) {
            return Err(StackError::ClosedForSend);
        }
        self.push_network_header(params, &mut packet)?;
        self.shared
            .outbound_tx
            .send(OutboundFrame {
                nic: self.nic,
                packet: packet.into_vec(),
            })
            .map_err(|_| StackError::ClosedForSend)
    }

    fn stats(&self) -> &Stats {
        &self.shared.stats
    }
}

use crate::netstack::{NetworkProtocol, NicId};
use bytes::Bytes;

/// An inbound packet as handed to a transport endpoint.
///
/// The transport header and payload are cheap reference-counted views; the
/// stack owns the packet for the duration of the handling call.
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    pub nic_id: NicId,
    pub network_protocol: NetworkProtocol,
    transport_header: Bytes,
    data: Bytes,
}

impl PacketBuffer {
    pub fn new(
        nic_id: NicId,
        network_protocol: NetworkProtocol,
        transport_header: impl Into<Bytes>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            nic_id,
            network_protocol,
            transport_header: transport_header.into(),
            data: data.into(),
        }
    }

    pub fn transport_header(&self) -> &[u8] {
        &self.transport_header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shares the payload without copying.
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn data_size(&self) -> usize {
        self.data.len()
    }
}

/// An outgoing packet built back to front: the payload is placed after a
/// reserved headroom, and each protocol layer pushes its header in front.
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    buf: Vec<u8>,
    head: usize,
    payload_offset: usize,
}

impl OutboundPacket {
    pub fn new(reserve_header_bytes: usize, payload: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(reserve_header_bytes + payload.len());
        buf.resize(reserve_header_bytes, 0);
        buf.extend_from_slice(payload);
        Self {
            buf,
            head: reserve_header_bytes,
            payload_offset: reserve_header_bytes,
        }
    }

    /// Pushes a zeroed header of `len` bytes in front of everything pushed so
    /// far and returns it. Grows the headroom when it is exhausted.
    pub fn push_header(&mut self, len: usize) -> &mut [u8] {
        if self.head < len {
            let extra = len - self.head;
            self.buf.splice(0..0, std::iter::repeat(0).take(extra));
            self.head += extra;
            self.payload_offset += extra;
        }
        self.head -= len;
        let header = &mut self.buf[self.head..self.head + len];
        header.fill(0);
        header
    }

    /// Length of all pushed headers plus the payload.
    pub fn size(&self) -> usize {
        self.buf.len() - self.head
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[self.payload_offset..]
    }

    pub fn payload_len(&self) -> usize {
        self.buf.len() - self.payload_offset
    }

    /// Pushed headers followed by the payload.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.head..]
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.drain(..self.head);
        self.buf
    }
}

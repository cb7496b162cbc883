/// Size of a UDP header without options (UDP has none).
pub const UDP_MINIMUM_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpFields {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    pub checksum: u16,
}

/// View over the raw bytes of a UDP header. Accessors assume at least
/// [`UDP_MINIMUM_SIZE`] bytes; check [`UdpHeader::is_complete`] first on
/// untrusted input.
pub struct UdpHeader<B>(pub B);

impl<B: AsRef<[u8]>> UdpHeader<B> {
    pub fn is_complete(&self) -> bool {
        self.0.as_ref().len() >= UDP_MINIMUM_SIZE
    }

    pub fn source_port(&self) -> u16 {
        self.word(0)
    }

    pub fn destination_port(&self) -> u16 {
        self.word(2)
    }

    /// Header plus payload length, as claimed by the sender.
    pub fn length(&self) -> u16 {
        self.word(4)
    }

    pub fn checksum(&self) -> u16 {
        self.word(6)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0.as_ref()[..UDP_MINIMUM_SIZE]
    }

    fn word(&self, at: usize) -> u16 {
        let b = self.0.as_ref();
        u16::from_be_bytes([b[at], b[at + 1]])
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> UdpHeader<B> {
    pub fn encode(&mut self, fields: &UdpFields) {
        let b = self.0.as_mut();
        b[0..2].copy_from_slice(&fields.src_port.to_be_bytes());
        b[2..4].copy_from_slice(&fields.dst_port.to_be_bytes());
        b[4..6].copy_from_slice(&fields.length.to_be_bytes());
        b[6..8].copy_from_slice(&fields.checksum.to_be_bytes());
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        self.0.as_mut()[6..8].copy_from_slice(&checksum.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_read_fields() {
        let mut raw = [0u8; UDP_MINIMUM_SIZE];
        let mut hdr = UdpHeader(&mut raw[..]);
        hdr.encode(&UdpFields {
            src_port: 53,
            dst_port: 40000,
            length: 37,
            checksum: 0,
        });
        hdr.set_checksum(0xbeef);

        assert_eq!(raw, [0, 53, 0x9c, 0x40, 0, 37, 0xbe, 0xef]);
        let hdr = UdpHeader(&raw[..]);
        assert_eq!(hdr.source_port(), 53);
        assert_eq!(hdr.destination_port(), 40000);
        assert_eq!(hdr.length(), 37);
        assert_eq!(hdr.checksum(), 0xbeef);
    }

    #[test]
    fn test_short_header_is_incomplete() {
        assert!(!UdpHeader(&[0u8; 7][..]).is_complete());
        assert!(UdpHeader(&[0u8; 8][..]).is_complete());
    }
}

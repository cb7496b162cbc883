//! Internet checksum (RFC 1071) helpers.
//!
//! All functions return the folded, *uncomplemented* one's-complement sum so
//! partial sums over separate buffers can be combined before the final
//! complement is taken.

use std::net::IpAddr;
use tundns_domain::TransportProtocol;

/// Adds the 16-bit big-endian words of `buf` to `initial`. An odd trailing
/// byte is padded with a zero low byte.
pub fn checksum(buf: &[u8], initial: u16) -> u16 {
    let mut sum = u32::from(initial);
    let mut words = buf.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }
    fold(sum)
}

/// One's-complement addition of two partial sums.
pub fn combine(a: u16, b: u16) -> u16 {
    fold(u32::from(a) + u32::from(b))
}

/// Partial sum of the transport pseudo-header for `src` → `dst`.
pub fn pseudo_header_checksum(
    protocol: TransportProtocol,
    src: IpAddr,
    dst: IpAddr,
    total_len: u16,
) -> u16 {
    let xsum = match (src, dst) {
        (IpAddr::V4(s), IpAddr::V4(d)) => checksum(&d.octets(), checksum(&s.octets(), 0)),
        (s, d) => checksum(&v6_octets(d), checksum(&v6_octets(s), 0)),
    };
    let xsum = combine(xsum, u16::from(protocol.number()));
    combine(xsum, total_len)
}

fn v6_octets(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

fn fold(mut sum: u32) -> u16 {
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

//! Value types shared with the user-space network stack.
//!
//! These mirror the vocabulary of the stack boundary: NIC identifiers,
//! protocol numbers, the four-tuple identifying a transport endpoint and the
//! parameters used when a route transmits a packet.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NicId(pub u32);

impl fmt::Display for NicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nic{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkProtocol {
    Ipv4,
    Ipv6,
}

impl NetworkProtocol {
    /// EtherType number of the protocol.
    pub const fn number(self) -> u16 {
        match self {
            NetworkProtocol::Ipv4 => 0x0800,
            NetworkProtocol::Ipv6 => 0x86dd,
        }
    }

    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => NetworkProtocol::Ipv4,
            IpAddr::V6(_) => NetworkProtocol::Ipv6,
        }
    }

    pub fn unspecified(self) -> IpAddr {
        match self {
            NetworkProtocol::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            NetworkProtocol::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// Narrows an IPv4-mapped IPv6 address to four bytes when this protocol
    /// is IPv4. Other addresses are returned unchanged.
    pub fn narrow(self, addr: IpAddr) -> IpAddr {
        match (self, addr) {
            (NetworkProtocol::Ipv4, IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => addr,
            },
            _ => addr,
        }
    }
}

impl fmt::Display for NetworkProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkProtocol::Ipv4 => f.write_str("ipv4"),
            NetworkProtocol::Ipv6 => f.write_str("ipv6"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl TransportProtocol {
    /// IANA protocol number, as carried in the IPv4 protocol / IPv6 next
    /// header field.
    pub const fn number(self) -> u8 {
        match self {
            TransportProtocol::Tcp => 6,
            TransportProtocol::Udp => 17,
        }
    }
}

/// Port reservation flags. Registration and unregistration of the same
/// endpoint must carry identical flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortFlags {
    /// Several endpoints may share the tuple (SO_REUSEPORT semantics).
    pub load_balanced: bool,
}

impl PortFlags {
    pub const LOAD_BALANCED: Self = Self {
        load_balanced: true,
    };
}

/// Transport endpoint four-tuple, seen from the stack: `local` is the
/// address a packet was sent to, `remote` the address it came from.
///
/// `None` addresses and zero ports are wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId {
    pub local_address: Option<IpAddr>,
    pub local_port: u16,
    pub remote_address: Option<IpAddr>,
    pub remote_port: u16,
}

impl EndpointId {
    pub fn listener(local_address: Option<IpAddr>, local_port: u16) -> Self {
        Self {
            local_address,
            local_port,
            remote_address: None,
            remote_port: 0,
        }
    }

    pub fn bound(local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            local_address: Some(local.ip()),
            local_port: local.port(),
            remote_address: Some(remote.ip()),
            remote_port: remote.port(),
        }
    }

    /// The same tuple seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            local_address: self.remote_address,
            local_port: self.remote_port,
            remote_address: self.local_address,
            remote_port: self.local_port,
        }
    }

    pub fn local_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.local_address
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            self.local_port,
        )
    }

    pub fn remote_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.remote_address
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            self.remote_port,
        )
    }

    /// Whether a fully bound packet tuple is accepted by this (possibly
    /// wildcard) endpoint id.
    pub fn accepts(&self, packet: &EndpointId) -> bool {
        fn addr_matches(pattern: Option<IpAddr>, actual: Option<IpAddr>) -> bool {
            pattern.is_none() || pattern == actual
        }

        self.local_port == packet.local_port
            && addr_matches(self.local_address, packet.local_address)
            && (self.remote_port == 0 || self.remote_port == packet.remote_port)
            && addr_matches(self.remote_address, packet.remote_address)
    }

    pub fn is_wildcard_local(&self) -> bool {
        self.local_address.is_none()
    }
}

/// Address used when binding through the stack. A `None` address is the
/// stack's wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FullAddress {
    pub nic: NicId,
    pub addr: Option<IpAddr>,
    pub port: u16,
}

impl FullAddress {
    pub fn new(nic: NicId, addr: Option<IpAddr>, port: u16) -> Self {
        Self { nic, addr, port }
    }

    /// Translates the caller's "any" sentinel (`0.0.0.0` / `::`) into the
    /// stack wildcard.
    pub fn normalized(nic: NicId, addr: IpAddr, port: u16) -> Self {
        let addr = if addr.is_unspecified() {
            None
        } else {
            Some(addr)
        };
        Self { nic, addr, port }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolAddress {
    pub protocol: NetworkProtocol,
    pub address: IpAddr,
    pub prefix_len: u8,
}

impl ProtocolAddress {
    /// Host-prefixed protocol address (`/32` or `/128`).
    pub fn host(address: IpAddr) -> Self {
        let (protocol, prefix_len) = match address {
            IpAddr::V4(_) => (NetworkProtocol::Ipv4, 32),
            IpAddr::V6(_) => (NetworkProtocol::Ipv6, 128),
        };
        Self {
            protocol,
            address,
            prefix_len,
        }
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.address, self.prefix_len, self.protocol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkHeaderParams {
    pub protocol: TransportProtocol,
    pub ttl: u8,
    pub tos: u8,
}

use crate::netstack::NicId;
use std::net::IpAddr;
use thiserror::Error;

/// Failures reported synchronously by the network stack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("unknown NIC {0}")]
    UnknownNic(NicId),

    #[error("NIC {0} already exists")]
    DuplicateNic(NicId),

    #[error("no route to {remote} via NIC {nic}")]
    NoRoute { nic: NicId, remote: IpAddr },

    #[error("port is in use")]
    PortInUse,

    #[error("duplicate address {0}")]
    DuplicateAddress(IpAddr),

    #[error("address family mismatch between {local} and {remote}")]
    AddressFamilyMismatch { local: IpAddr, remote: IpAddr },

    #[error("endpoint is closed")]
    Closed,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("message too long: {0} bytes")]
    MessageTooLong(usize),

    #[error("link closed for send")]
    ClosedForSend,
}

/// Errors delivered asynchronously to a registered transport endpoint.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("destination port unreachable")]
    PortUnreachable,

    #[error("destination host unreachable")]
    HostUnreachable,

    #[error("destination network unreachable")]
    NetworkUnreachable,

    #[error("packet too big (mtu {mtu})")]
    PacketTooBig { mtu: u32 },
}

#[derive(Error, Debug)]
pub enum TunDnsError {
    #[error("can not listen on tun: {0}")]
    Listen(#[source] StackError),

    #[error("no route for reply: {0}")]
    Route(#[source] StackError),

    #[error("failed to write UDP packet: {0}")]
    Send(#[source] StackError),

    #[error("failed to pack DNS message: {0}")]
    Encode(String),

    #[error("failed to unpack DNS message: {0}")]
    Decode(String),

    #[error("failed to create DNS server on tun: {0}")]
    Config(String),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("resolver error: {0}")]
    Resolver(String),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

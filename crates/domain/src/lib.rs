//! tundns domain layer
pub mod config;
pub mod errors;
pub mod netstack;
pub mod packet;
pub mod stats;

pub use config::{Config, ConfigError, LoggingConfig, TunConfig, TunDnsConfig};
pub use errors::{StackError, TransportError, TunDnsError};
pub use netstack::{
    EndpointId, FullAddress, NetworkHeaderParams, NetworkProtocol, NicId, PortFlags,
    ProtocolAddress, TransportProtocol,
};
pub use packet::{OutboundPacket, PacketBuffer};
pub use stats::{StatCounter, Stats, UdpStats};

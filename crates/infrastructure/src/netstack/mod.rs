pub mod checksum;
pub mod memory;
mod packet_writer;
pub mod udp_header;

pub use memory::{MemoryStack, OutboundFrame};
pub use packet_writer::write_udp;

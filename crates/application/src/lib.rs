//! tundns application layer: collaborator ports and the DNS query handler.
pub mod dns_message;
pub mod ports;
pub mod use_cases;

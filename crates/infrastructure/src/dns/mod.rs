pub mod service;
pub mod tcp;

pub use service::DnsService;
pub use tcp::TcpResponseWriter;

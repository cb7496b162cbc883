pub mod dns;

pub use dns::DnsQueryHandler;

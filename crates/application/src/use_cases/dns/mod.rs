mod handle_query;

pub use handle_query::{DnsQueryHandler, FAKE_IP_TTL};

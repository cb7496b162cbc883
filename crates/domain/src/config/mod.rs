pub mod errors;
pub mod logging;
pub mod root;
pub mod tun;

pub use errors::ConfigError;
pub use logging::LoggingConfig;
pub use root::Config;
pub use tun::{TunConfig, TunDnsConfig};

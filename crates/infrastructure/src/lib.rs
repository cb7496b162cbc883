pub mod dns;
pub mod logging;
pub mod netstack;
pub mod tun;

pub use logging::init_logging;

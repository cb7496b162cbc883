use serde::{Deserialize, Serialize};

/// `[tun]` section: the virtual interface and DNS-on-tun listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TunConfig {
    #[serde(default)]
    pub device_url: String,

    #[serde(default = "default_nic_id")]
    pub nic_id: u32,

    /// `host:port` the DNS server listens on inside the tun network. Empty or
    /// port `0` disables DNS-on-tun.
    #[serde(default)]
    pub dns_listen: String,

    #[serde(default)]
    pub dns: TunDnsConfig,
}

impl Default for TunConfig {
    fn default() -> Self {
        Self {
            device_url: String::new(),
            nic_id: default_nic_id(),
            dns_listen: String::new(),
            dns: TunDnsConfig::default(),
        }
    }
}

/// `[tun.dns]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TunDnsConfig {
    /// Upper bound on UDP queries being resolved concurrently. Datagrams
    /// arriving beyond it are dropped and counted.
    #[serde(default = "default_max_inflight_queries")]
    pub max_inflight_queries: usize,

    #[serde(default = "default_tcp_idle_timeout_secs")]
    pub tcp_idle_timeout_secs: u64,
}

impl Default for TunDnsConfig {
    fn default() -> Self {
        Self {
            max_inflight_queries: default_max_inflight_queries(),
            tcp_idle_timeout_secs: default_tcp_idle_timeout_secs(),
        }
    }
}

fn default_nic_id() -> u32 {
    1
}

fn default_max_inflight_queries() -> usize {
    1024
}

fn default_tcp_idle_timeout_secs() -> u64 {
    10
}

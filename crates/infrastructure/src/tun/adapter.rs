use super::dns_server::{DnsServerOptions, TunDnsServer};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tracing::{info, warn};
use tundns_application::ports::{DnsResolver, NetStack, ResolverEnhancer, TunAdapter};
use tundns_domain::{NicId, TunConfig, TunDnsError};

#[derive(Default)]
struct AdapterState {
    dns_server: Option<TunDnsServer>,
    // Last resolver set, applied to servers created later.
    resolver: Option<Arc<dyn DnsResolver>>,
    mapper: Option<Arc<dyn ResolverEnhancer>>,
}

/// Tun adapter backed by a user-space network stack.
pub struct NetstackTunAdapter {
    stack: Arc<dyn NetStack>,
    nic_id: NicId,
    device_url: String,
    runtime: Handle,
    dns_options: DnsServerOptions,
    state: Mutex<AdapterState>,
}

impl NetstackTunAdapter {
    /// Must be called from within a tokio runtime; DNS requests are served
    /// on it.
    pub fn new(
        stack: Arc<dyn NetStack>,
        nic_id: NicId,
        device_url: impl Into<String>,
    ) -> Result<Self, TunDnsError> {
        let runtime = Handle::try_current().map_err(|e| TunDnsError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(stack, nic_id, device_url, runtime))
    }

    pub fn with_runtime(
        stack: Arc<dyn NetStack>,
        nic_id: NicId,
        device_url: impl Into<String>,
        runtime: Handle,
    ) -> Self {
        Self {
            stack,
            nic_id,
            device_url: device_url.into(),
            runtime,
            dns_options: DnsServerOptions::default(),
            state: Mutex::new(AdapterState::default()),
        }
    }

    pub fn with_dns_options(mut self, options: DnsServerOptions) -> Self {
        self.dns_options = options;
        self
    }

    /// Builds the adapter and starts DNS-on-tun at `config.dns_listen`.
    pub fn from_config(stack: Arc<dyn NetStack>, config: &TunConfig) -> Result<Self, TunDnsError> {
        let adapter = Self::new(stack, NicId(config.nic_id), config.device_url.clone())?
            .with_dns_options((&config.dns).into());
        adapter.recreate_dns_server(&config.dns_listen)?;
        Ok(adapter)
    }

    pub fn stack(&self) -> &Arc<dyn NetStack> {
        &self.stack
    }

    pub fn nic_id(&self) -> NicId {
        self.nic_id
    }

    /// Runs `f` against the live DNS server, if any.
    pub fn with_dns_server<R>(&self, f: impl FnOnce(&TunDnsServer) -> R) -> Option<R> {
        self.lock_state().dns_server.as_ref().map(f)
    }

    fn lock_state(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TunAdapter for NetstackTunAdapter {
    fn close(&self) {
        if let Some(mut server) = self.lock_state().dns_server.take() {
            server.stop();
        }
    }

    fn device_url(&self) -> String {
        self.device_url.clone()
    }

    fn recreate_dns_server(&self, addr: &str) -> Result<(), TunDnsError> {
        let mut state = self.lock_state();

        if addr.is_empty() && state.dns_server.is_none() {
            return Ok(());
        }
        if let Some(server) = &state.dns_server {
            if addr.parse::<SocketAddr>().ok() == Some(server.listen_addr()) {
                return Ok(());
            }
        }

        if let Some(mut server) = state.dns_server.take() {
            server.stop();
        }

        let Some(target) = parse_listen_addr(addr)? else {
            return Ok(());
        };

        let mut server = TunDnsServer::create(
            Arc::clone(&self.stack),
            target,
            self.nic_id,
            self.runtime.clone(),
            self.dns_options.clone(),
        )?;

        if state.resolver.is_some() {
            if let Err(e) = server.reset_resolver(state.resolver.clone(), state.mapper.clone()) {
                warn!(error = %e, addr = %target, "Failed to apply resolver to tun DNS server");
            }
        }

        info!(addr = %target, nic = %self.nic_id, "Tun DNS server listening");
        state.dns_server = Some(server);
        Ok(())
    }

    fn reset_dns_resolver(
        &self,
        resolver: Option<Arc<dyn DnsResolver>>,
        mapper: Option<Arc<dyn ResolverEnhancer>>,
    ) -> Result<(), TunDnsError> {
        let mut state = self.lock_state();
        if let Some(server) = state.dns_server.as_mut() {
            server.reset_resolver(resolver.clone(), mapper.clone())?;
        }
        if resolver.is_some() {
            state.resolver = resolver;
            state.mapper = mapper;
        }
        Ok(())
    }

    fn dns_listen(&self) -> String {
        self.lock_state()
            .dns_server
            .as_ref()
            .map(TunDnsServer::dns_listen)
            .unwrap_or_default()
    }
}

/// Parses a `host:port` listen address.
///
/// `Ok(None)` means DNS-on-tun is disabled: the address has no port, the
/// port is empty or `0`, or the string cannot be split into host and port.
fn parse_listen_addr(addr: &str) -> Result<Option<SocketAddr>, TunDnsError> {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return Ok(None);
    };
    let bracketed = host.starts_with('[') && host.ends_with(']');
    if host.contains(':') && !bracketed {
        return Ok(None);
    }
    if port.is_empty() || port == "0" {
        return Ok(None);
    }

    addr.parse::<SocketAddr>()
        .map(Some)
        .map_err(|e| TunDnsError::InvalidAddress(format!("{addr}: {e}")))
}

use super::dns_endpoint::DnsUdpEndpoint;
use crate::dns::DnsService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error};
use tundns_application::ports::{
    DnsResolver, NetStack, ResolverEnhancer, StackListener, TransportEndpoint,
};
use tundns_application::use_cases::DnsQueryHandler;
use tundns_domain::{
    EndpointId, FullAddress, NetworkProtocol, NicId, PortFlags, ProtocolAddress,
    TransportProtocol, TunDnsConfig, TunDnsError,
};

/// The UDP endpoint serves both IP versions.
const DNS_NETWORK_PROTOCOLS: [NetworkProtocol; 2] = [NetworkProtocol::Ipv4, NetworkProtocol::Ipv6];
const DNS_PORT_FLAGS: PortFlags = PortFlags::LOAD_BALANCED;

#[derive(Debug, Clone)]
pub struct DnsServerOptions {
    pub max_inflight_queries: usize,
    pub tcp_idle_timeout: Duration,
}

impl Default for DnsServerOptions {
    fn default() -> Self {
        (&TunDnsConfig::default()).into()
    }
}

impl From<&TunDnsConfig> for DnsServerOptions {
    fn from(config: &TunDnsConfig) -> Self {
        Self {
            max_inflight_queries: config.max_inflight_queries,
            tcp_idle_timeout: Duration::from_secs(config.tcp_idle_timeout_secs),
        }
    }
}

/// A DNS server living inside the tun network: a UDP endpoint and a TCP
/// listener registered on the stack at one address.
///
/// Requests are dropped until a resolver is set with
/// [`TunDnsServer::reset_resolver`]. Dropping the server stops it.
pub struct TunDnsServer {
    stack: Arc<dyn NetStack>,
    nic_id: NicId,
    listen: SocketAddr,
    runtime: Handle,
    options: DnsServerOptions,
    udp_endpoint: Arc<DnsUdpEndpoint>,
    udp_endpoint_id: EndpointId,
    udp_registered: bool,
    tcp_listener: Arc<dyn StackListener>,
    resolver: Option<Arc<dyn DnsResolver>>,
    mapper: Option<Arc<dyn ResolverEnhancer>>,
    service: Option<Arc<DnsService>>,
    stopped: bool,
}

impl TunDnsServer {
    pub fn create(
        stack: Arc<dyn NetStack>,
        addr: SocketAddr,
        nic_id: NicId,
        runtime: Handle,
        options: DnsServerOptions,
    ) -> Result<Self, TunDnsError> {
        let protocol = NetworkProtocol::of(&addr.ip());

        // IP fragments are only reassembled for addresses assigned to the NIC.
        let protocol_address = ProtocolAddress::host(addr.ip());
        if let Err(e) = stack.add_protocol_address(nic_id, protocol_address) {
            error!(
                error = %e,
                nic = %nic_id,
                address = %protocol_address,
                "AddProtocolAddress failed"
            );
        }

        let address = FullAddress::normalized(nic_id, addr.ip(), addr.port());
        let udp_endpoint_id = EndpointId::listener(address.addr, address.port);
        let udp_endpoint = Arc::new(DnsUdpEndpoint::new(
            Arc::clone(&stack),
            runtime.clone(),
            options.max_inflight_queries,
        ));

        let udp_registered = match stack.register_transport_endpoint(
            &DNS_NETWORK_PROTOCOLS,
            TransportProtocol::Udp,
            udp_endpoint_id,
            udp_endpoint.clone(),
            DNS_PORT_FLAGS,
            nic_id,
        ) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, addr = %addr, "Unable to start UDP DNS on tun");
                false
            }
        };

        let tcp_listener = match stack.listen_tcp(address, protocol) {
            Ok(listener) => listener,
            Err(e) => {
                if udp_registered {
                    let endpoint: Arc<dyn TransportEndpoint> = udp_endpoint;
                    stack.unregister_transport_endpoint(
                        &DNS_NETWORK_PROTOCOLS,
                        TransportProtocol::Udp,
                        udp_endpoint_id,
                        &endpoint,
                        DNS_PORT_FLAGS,
                        nic_id,
                    );
                }
                return Err(TunDnsError::Listen(e));
            }
        };

        Ok(Self {
            stack,
            nic_id,
            listen: addr,
            runtime,
            options,
            udp_endpoint,
            udp_endpoint_id,
            udp_registered,
            tcp_listener,
            resolver: None,
            mapper: None,
            service: None,
            stopped: false,
        })
    }

    /// Unregisters from the stack and stops serving. Safe to call twice.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Some(service) = self.service.take() {
            service.shutdown();
        }
        self.udp_endpoint.set_service(None);
        self.tcp_listener.close();

        if self.udp_registered {
            let endpoint: Arc<dyn TransportEndpoint> = self.udp_endpoint.clone();
            self.stack.unregister_transport_endpoint(
                &DNS_NETWORK_PROTOCOLS,
                TransportProtocol::Udp,
                self.udp_endpoint_id,
                &endpoint,
                DNS_PORT_FLAGS,
                self.nic_id,
            );
            self.udp_registered = false;
        }
        debug!(addr = %self.listen, "Tun DNS server stopped");
    }

    /// Serves requests from `resolver` (and `mapper`) from now on. Setting
    /// the pair already in use is a no-op; the UDP endpoint stays
    /// registered throughout.
    pub fn reset_resolver(
        &mut self,
        resolver: Option<Arc<dyn DnsResolver>>,
        mapper: Option<Arc<dyn ResolverEnhancer>>,
    ) -> Result<(), TunDnsError> {
        let Some(resolver) = resolver else {
            return Err(TunDnsError::Config("resolver not provided".to_string()));
        };

        if self.resolver.as_ref().is_some_and(|r| Arc::ptr_eq(r, &resolver))
            && same_mapper(self.mapper.as_ref(), mapper.as_ref())
        {
            return Ok(());
        }

        let handler = DnsQueryHandler::new(Arc::clone(&resolver), mapper.clone());
        let service = Arc::new(
            DnsService::new(handler).with_tcp_idle_timeout(self.options.tcp_idle_timeout),
        );

        if let Some(old) = self.service.replace(Arc::clone(&service)) {
            old.shutdown();
        }
        self.udp_endpoint.set_service(Some(Arc::clone(&service)));
        if !self.stopped {
            service.activate_and_serve(&self.runtime, Arc::clone(&self.tcp_listener));
        }

        self.resolver = Some(resolver);
        self.mapper = mapper;
        Ok(())
    }

    /// The configured listen address as `host:port`.
    pub fn dns_listen(&self) -> String {
        self.listen.to_string()
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen
    }

    pub fn nic_id(&self) -> NicId {
        self.nic_id
    }

    pub fn endpoint_id(&self) -> EndpointId {
        self.udp_endpoint_id
    }

    /// Identity of the UDP endpoint on the stack; stable across resolver
    /// changes.
    pub fn endpoint_unique_id(&self) -> u64 {
        self.udp_endpoint.unique_id()
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }
}

impl Drop for TunDnsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn same_mapper(
    current: Option<&Arc<dyn ResolverEnhancer>>,
    next: Option<&Arc<dyn ResolverEnhancer>>,
) -> bool {
    match (current, next) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

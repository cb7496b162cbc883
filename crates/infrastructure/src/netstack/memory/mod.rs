//! In-process network stack.
//!
//! Packets are injected as raw IP datagrams and demultiplexed to registered
//! transport endpoints; everything transmitted is queued as
//! [`OutboundFrame`]s. TCP connections are in-memory duplex pipes handed to
//! listeners opened through [`NetStack::listen_tcp`].

mod listener;
mod route;

pub use listener::MemoryListener;
pub use route::{MemoryRoute, OutboundFrame};

use crate::netstack::udp_header::{UdpFields, UdpHeader, UDP_MINIMUM_SIZE};
use etherparse::{NetHeaders, PacketHeaders, TransportHeader};
use listener::Incoming;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tundns_application::ports::{NetStack, Route, StackListener, TransportEndpoint};
use tundns_domain::{
    EndpointId, FullAddress, NetworkProtocol, NicId, PacketBuffer, PortFlags, ProtocolAddress,
    StackError, Stats, TransportError, TransportProtocol,
};

const TCP_BACKLOG: usize = 128;
const TCP_PIPE_CAPACITY: usize = 64 * 1024;

type ListenerKey = (NicId, Option<IpAddr>, u16);

pub(crate) struct ListenerEntry {
    protocol: NetworkProtocol,
    tx: mpsc::Sender<Incoming>,
}

pub(crate) type ListenerTable = Mutex<HashMap<ListenerKey, ListenerEntry>>;

#[derive(Debug, Clone, Default)]
struct Nic {
    addresses: Vec<ProtocolAddress>,
    checksum_offload: bool,
    link_up: bool,
}

struct Registration {
    network_protocols: Vec<NetworkProtocol>,
    transport: TransportProtocol,
    id: EndpointId,
    endpoint: Arc<dyn TransportEndpoint>,
    flags: PortFlags,
    nic: NicId,
}

impl Registration {
    fn overlaps(&self, protocols: &[NetworkProtocol], transport: TransportProtocol) -> bool {
        self.transport == transport && protocols.iter().any(|p| self.network_protocols.contains(p))
    }
}

/// State reachable from routes handed out by the stack.
pub(crate) struct Shared {
    stats: Stats,
    nics: RwLock<HashMap<NicId, Nic>>,
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl Shared {
    fn nics(&self) -> std::sync::RwLockReadGuard<'_, HashMap<NicId, Nic>> {
        self.nics.read().unwrap_or_else(|e| e.into_inner())
    }

    fn nics_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<NicId, Nic>> {
        self.nics.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn link_up(&self, nic: NicId) -> bool {
        self.nics().get(&nic).is_some_and(|n| n.link_up)
    }
}

pub struct MemoryStack {
    shared: Arc<Shared>,
    endpoints: RwLock<Vec<Registration>>,
    listeners: Arc<ListenerTable>,
    outbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<OutboundFrame>>,
    next_unique_id: AtomicU64,
}

impl Default for MemoryStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStack {
    pub fn new() -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                stats: Stats::default(),
                nics: RwLock::new(HashMap::new()),
                outbound_tx,
            }),
            endpoints: RwLock::new(Vec::new()),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            next_unique_id: AtomicU64::new(1),
        }
    }

    /// Adds a NIC with its link up and transport checksums computed in
    /// software.
    pub fn create_nic(&self, nic: NicId) -> Result<(), StackError> {
        let mut nics = self.shared.nics_mut();
        if nics.contains_key(&nic) {
            return Err(StackError::DuplicateNic(nic));
        }
        nics.insert(
            nic,
            Nic {
                link_up: true,
                ..Nic::default()
            },
        );
        Ok(())
    }

    pub fn set_checksum_offload(&self, nic: NicId, offload: bool) -> Result<(), StackError> {
        self.update_nic(nic, |n| n.checksum_offload = offload)
    }

    /// A NIC whose link is down fails every transmit with
    /// [`StackError::ClosedForSend`].
    pub fn set_link_up(&self, nic: NicId, up: bool) -> Result<(), StackError> {
        self.update_nic(nic, |n| n.link_up = up)
    }

    pub fn protocol_addresses(&self, nic: NicId) -> Vec<ProtocolAddress> {
        self.shared
            .nics()
            .get(&nic)
            .map(|n| n.addresses.clone())
            .unwrap_or_default()
    }

    fn update_nic(&self, nic: NicId, f: impl FnOnce(&mut Nic)) -> Result<(), StackError> {
        let mut nics = self.shared.nics_mut();
        let entry = nics.get_mut(&nic).ok_or(StackError::UnknownNic(nic))?;
        f(entry);
        Ok(())
    }

    /// Number of live transport endpoint registrations.
    pub fn registered_endpoints(&self) -> usize {
        self.endpoints().len()
    }

    /// Endpoint ids registered for `transport`, in registration order.
    pub fn registrations(&self, transport: TransportProtocol) -> Vec<(EndpointId, u64)> {
        self.endpoints()
            .iter()
            .filter(|r| r.transport == transport)
            .map(|r| (r.id, r.endpoint.unique_id()))
            .collect()
    }

    pub fn has_tcp_listener(&self, address: FullAddress) -> bool {
        self.listener_table()
            .get(&(address.nic, address.addr, address.port))
            .is_some_and(|entry| !entry.tx.is_closed())
    }

    /// Waits for the next packet the stack transmits.
    pub async fn next_outbound(&self) -> Option<OutboundFrame> {
        self.outbound_rx.lock().await.recv().await
    }

    pub fn try_next_outbound(&self) -> Option<OutboundFrame> {
        self.outbound_rx.try_lock().ok()?.try_recv().ok()
    }

    /// Delivers a raw IP packet received on `nic`.
    ///
    /// Returns whether a transport endpoint took the packet. Unparseable
    /// packets and packets nobody listens for are dropped.
    pub fn inject_inbound(&self, nic: NicId, packet: &[u8]) -> bool {
        if !self.shared.nics().contains_key(&nic) {
            debug!(nic = %nic, "Inbound packet on unknown NIC");
            return false;
        }

        let parsed = match PacketHeaders::from_ip_slice(packet) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(nic = %nic, error = %e, "Dropping unparseable inbound packet");
                return false;
            }
        };

        let (protocol, src, dst) = match &parsed.net {
            Some(NetHeaders::Ipv4(h, _)) => (
                NetworkProtocol::Ipv4,
                IpAddr::from(h.source),
                IpAddr::from(h.destination),
            ),
            Some(NetHeaders::Ipv6(h, _)) => (
                NetworkProtocol::Ipv6,
                IpAddr::from(h.source),
                IpAddr::from(h.destination),
            ),
            _ => return false,
        };

        let Some(TransportHeader::Udp(udp)) = &parsed.transport else {
            return false;
        };

        let id = EndpointId::bound(
            SocketAddr::new(dst, udp.destination_port),
            SocketAddr::new(src, udp.source_port),
        );
        let mut header = [0u8; UDP_MINIMUM_SIZE];
        UdpHeader(&mut header[..]).encode(&UdpFields {
            src_port: udp.source_port,
            dst_port: udp.destination_port,
            length: udp.length,
            checksum: udp.checksum,
        });
        let buffer = PacketBuffer::new(
            nic,
            protocol,
            header.to_vec(),
            parsed.payload.slice().to_vec(),
        );
        self.deliver(TransportProtocol::Udp, id, &buffer)
    }

    /// Hands an already parsed transport packet to the matching endpoint.
    /// Exact local-address registrations win over wildcard ones.
    pub fn deliver(
        &self,
        transport: TransportProtocol,
        id: EndpointId,
        packet: &PacketBuffer,
    ) -> bool {
        let Some(endpoint) = self.lookup(transport, packet.nic_id, packet.network_protocol, &id)
        else {
            debug!(
                local = %id.local_socket_addr(),
                remote = %id.remote_socket_addr(),
                "No endpoint for inbound packet"
            );
            return false;
        };
        if transport == TransportProtocol::Udp {
            self.shared.stats.udp.packets_received.increment();
        }
        endpoint.handle_packet(id, packet);
        true
    }

    /// Reports a transport error for `id` to its endpoint, as an ICMP
    /// message would.
    pub fn deliver_error(
        &self,
        transport: TransportProtocol,
        id: EndpointId,
        error: TransportError,
        packet: &PacketBuffer,
    ) -> bool {
        match self.lookup(transport, packet.nic_id, packet.network_protocol, &id) {
            Some(endpoint) => {
                endpoint.handle_error(error, packet);
                true
            }
            None => false,
        }
    }

    fn lookup(
        &self,
        transport: TransportProtocol,
        nic: NicId,
        protocol: NetworkProtocol,
        id: &EndpointId,
    ) -> Option<Arc<dyn TransportEndpoint>> {
        let endpoints = self.endpoints();
        let candidates: Vec<&Registration> = endpoints
            .iter()
            .filter(|r| {
                r.transport == transport
                    && r.nic == nic
                    && r.network_protocols.contains(&protocol)
                    && r.id.accepts(id)
            })
            .collect();

        let has_exact = candidates.iter().any(|r| !r.id.is_wildcard_local());
        let group: Vec<&Registration> = candidates
            .into_iter()
            .filter(|r| has_exact != r.id.is_wildcard_local())
            .collect();
        if group.is_empty() {
            return None;
        }
        // Load-balanced groups spread flows by source port.
        let pick = usize::from(id.remote_port) % group.len();
        Some(group[pick].endpoint.clone())
    }

    /// Opens an in-memory TCP connection from `client` to `server`.
    ///
    /// The returned stream is the client end; the server end is queued on
    /// the matching listener.
    pub fn connect_tcp(
        &self,
        nic: NicId,
        client: SocketAddr,
        server: SocketAddr,
    ) -> Result<DuplexStream, StackError> {
        let table = self.listener_table();
        let protocol = NetworkProtocol::of(&server.ip());
        let entry = table
            .get(&(nic, Some(server.ip()), server.port()))
            .or_else(|| {
                table
                    .get(&(nic, None, server.port()))
                    .filter(|e| e.protocol == protocol)
            })
            .ok_or(StackError::ConnectionRefused)?;

        let (client_end, server_end) = tokio::io::duplex(TCP_PIPE_CAPACITY);
        entry
            .tx
            .try_send((server_end, client))
            .map_err(|_| StackError::ConnectionRefused)?;
        Ok(client_end)
    }

    fn endpoints(&self) -> std::sync::RwLockReadGuard<'_, Vec<Registration>> {
        self.endpoints.read().unwrap_or_else(|e| e.into_inner())
    }

    fn endpoints_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Registration>> {
        self.endpoints.write().unwrap_or_else(|e| e.into_inner())
    }

    fn listener_table(&self) -> MutexGuard<'_, HashMap<ListenerKey, ListenerEntry>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl NetStack for MemoryStack {
    fn unique_id(&self) -> u64 {
        self.next_unique_id.fetch_add(1, Ordering::Relaxed)
    }

    fn stats(&self) -> &Stats {
        &self.shared.stats
    }

    fn add_protocol_address(
        &self,
        nic: NicId,
        address: ProtocolAddress,
    ) -> Result<(), StackError> {
        let mut nics = self.shared.nics_mut();
        let entry = nics.get_mut(&nic).ok_or(StackError::UnknownNic(nic))?;
        if entry.addresses.iter().any(|a| a.address == address.address) {
            return Err(StackError::DuplicateAddress(address.address));
        }
        entry.addresses.push(address);
        Ok(())
    }

    fn register_transport_endpoint(
        &self,
        network_protocols: &[NetworkProtocol],
        transport: TransportProtocol,
        id: EndpointId,
        endpoint: Arc<dyn TransportEndpoint>,
        flags: PortFlags,
        nic: NicId,
    ) -> Result<(), StackError> {
        if !self.shared.nics().contains_key(&nic) {
            return Err(StackError::UnknownNic(nic));
        }

        let mut endpoints = self.endpoints_mut();
        let conflict = endpoints.iter().any(|r| {
            r.nic == nic
                && r.id == id
                && r.overlaps(network_protocols, transport)
                && !(r.flags.load_balanced && flags.load_balanced)
        });
        if conflict {
            return Err(StackError::PortInUse);
        }

        endpoints.push(Registration {
            network_protocols: network_protocols.to_vec(),
            transport,
            id,
            endpoint,
            flags,
            nic,
        });
        Ok(())
    }

    fn unregister_transport_endpoint(
        &self,
        network_protocols: &[NetworkProtocol],
        transport: TransportProtocol,
        id: EndpointId,
        endpoint: &Arc<dyn TransportEndpoint>,
        flags: PortFlags,
        nic: NicId,
    ) {
        let unique_id = endpoint.unique_id();
        let mut endpoints = self.endpoints_mut();
        let before = endpoints.len();
        endpoints.retain(|r| {
            !(r.nic == nic
                && r.transport == transport
                && r.id == id
                && r.flags == flags
                && r.network_protocols == network_protocols
                && r.endpoint.unique_id() == unique_id)
        });
        if endpoints.len() == before {
            warn!(
                nic = %nic,
                local = %id.local_socket_addr(),
                endpoint = unique_id,
                "Unregister matched no transport endpoint"
            );
        }
    }

    fn find_route(
        &self,
        nic: NicId,
        local: IpAddr,
        remote: IpAddr,
        protocol: NetworkProtocol,
    ) -> Result<Arc<dyn Route>, StackError> {
        let checksum_offload = self
            .shared
            .nics()
            .get(&nic)
            .map(|n| n.checksum_offload)
            .ok_or(StackError::UnknownNic(nic))?;

        if NetworkProtocol::of(&local) != protocol || NetworkProtocol::of(&remote) != protocol {
            return Err(StackError::AddressFamilyMismatch { local, remote });
        }
        if remote.is_unspecified() {
            return Err(StackError::NoRoute { nic, remote });
        }

        // Any local address is accepted: replies may be spoofed from
        // addresses the NIC does not own.
        Ok(Arc::new(MemoryRoute {
            nic,
            local,
            remote,
            protocol,
            checksum_offload,
            shared: self.shared.clone(),
        }))
    }

    fn listen_tcp(
        &self,
        address: FullAddress,
        protocol: NetworkProtocol,
    ) -> Result<Arc<dyn StackListener>, StackError> {
        if !self.shared.nics().contains_key(&address.nic) {
            return Err(StackError::UnknownNic(address.nic));
        }
        if let Some(addr) = address.addr {
            if NetworkProtocol::of(&addr) != protocol {
                return Err(StackError::AddressFamilyMismatch {
                    local: addr,
                    remote: addr,
                });
            }
        }

        let key = (address.nic, address.addr, address.port);
        let mut table = self.listener_table();
        if table.get(&key).is_some_and(|e| !e.tx.is_closed()) {
            return Err(StackError::PortInUse);
        }

        let (tx, rx) = mpsc::channel(TCP_BACKLOG);
        table.insert(key, ListenerEntry { protocol, tx });
        Ok(Arc::new(MemoryListener {
            address,
            incoming: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
            table: Arc::downgrade(&self.listeners),
        }))
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use etherparse::{NetHeaders, PacketBuilder, PacketHeaders, TransportHeader};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tundns_application::dns_message;
use tundns_application::ports::{DnsResolver, FakeIpMatcher};
use tundns_domain::{NicId, TunDnsError};
use tundns_infrastructure::netstack::{MemoryStack, OutboundFrame};

pub const NIC: NicId = NicId(1);

pub fn stack() -> Arc<MemoryStack> {
    let stack = Arc::new(MemoryStack::new());
    stack.create_nic(NIC).unwrap();
    stack
}

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

pub fn query(id: u16, domain: &str, record_type: RecordType) -> Message {
    let mut message = Message::new(id, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(domain).unwrap(), record_type));
    message
}

pub fn query_bytes(id: u16, domain: &str, record_type: RecordType) -> Vec<u8> {
    dns_message::pack(&query(id, domain, record_type)).unwrap()
}

/// Resolver answering every A question with one fixed address.
pub struct StaticResolver {
    answer: Ipv4Addr,
    calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.parse().unwrap(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn exchange(&self, request: &Message) -> Result<Message, TunDnsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut response = Message::new(request.id(), MessageType::Response, OpCode::Query);
        response.add_queries(request.queries().to_vec());
        for q in request.queries() {
            if q.query_type() == RecordType::A {
                response.add_answer(Record::from_rdata(
                    q.name().clone(),
                    300,
                    RData::A(A(self.answer)),
                ));
            }
        }
        Ok(response)
    }
}

/// Treats 198.18.0.0/16 as the fake-IP range and counts lookups.
#[derive(Default)]
pub struct RangeMatcher {
    pub lookups: AtomicUsize,
}

impl FakeIpMatcher for RangeMatcher {
    fn is_fake_ip(&self, ip: IpAddr) -> bool {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        matches!(ip, IpAddr::V4(v4) if v4.octets()[0] == 198 && v4.octets()[1] == 18)
    }
}

/// Raw IP/UDP packet `src` → `dst`.
pub fn udp_packet(src: SocketAddr, dst: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let builder = match (src.ip(), dst.ip()) {
        (IpAddr::V4(s), IpAddr::V4(d)) => PacketBuilder::ipv4(s.octets(), d.octets(), 64),
        (IpAddr::V6(s), IpAddr::V6(d)) => PacketBuilder::ipv6(s.octets(), d.octets(), 64),
        _ => panic!("mixed address families"),
    }
    .udp(src.port(), dst.port());

    let mut packet = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).unwrap();
    packet
}

/// A UDP packet the stack sent, taken apart.
#[derive(Debug)]
pub struct UdpReply {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub checksum: u16,
    pub pseudo_src: IpAddr,
    /// UDP header plus payload.
    pub segment: Vec<u8>,
    pub payload: Vec<u8>,
}

impl UdpReply {
    pub fn message(&self) -> Message {
        dns_message::unpack(&self.payload).unwrap()
    }
}

pub fn parse_udp(frame: &OutboundFrame) -> UdpReply {
    let parsed = PacketHeaders::from_ip_slice(&frame.packet).unwrap();
    let (src_ip, dst_ip, ip_header_len) = match &parsed.net {
        Some(NetHeaders::Ipv4(h, _)) => (IpAddr::from(h.source), IpAddr::from(h.destination), 20),
        Some(NetHeaders::Ipv6(h, _)) => (IpAddr::from(h.source), IpAddr::from(h.destination), 40),
        other => panic!("unexpected network header: {other:?}"),
    };
    let Some(TransportHeader::Udp(udp)) = &parsed.transport else {
        panic!("not a UDP packet");
    };

    UdpReply {
        src: SocketAddr::new(src_ip, udp.source_port),
        dst: SocketAddr::new(dst_ip, udp.destination_port),
        checksum: udp.checksum,
        pseudo_src: src_ip,
        segment: frame.packet[ip_header_len..].to_vec(),
        payload: parsed.payload.slice().to_vec(),
    }
}

/// Next packet the stack transmits, failing the test after two seconds.
pub async fn next_reply(stack: &MemoryStack) -> UdpReply {
    let frame = tokio::time::timeout(Duration::from_secs(2), stack.next_outbound())
        .await
        .expect("no reply within 2s")
        .expect("outbound queue closed");
    parse_udp(&frame)
}

/// Asserts nothing is transmitted within a short grace period.
pub async fn assert_no_reply(stack: &MemoryStack) {
    let waited = tokio::time::timeout(Duration::from_millis(200), stack.next_outbound()).await;
    assert!(waited.is_err(), "unexpected outbound packet: {waited:?}");
}

pub fn first_a(message: &Message) -> Option<Ipv4Addr> {
    message.answers().iter().find_map(|r| match r.data() {
        RData::A(a) => Some(a.0),
        _ => None,
    })
}

#![allow(dead_code)]

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tundns_application::ports::{DnsResolver, ResolverEnhancer};
use tundns_domain::TunDnsError;

pub fn query(id: u16, domain: &str, record_type: RecordType) -> Message {
    let mut message = Message::new(id, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(domain).unwrap(), record_type));
    message
}

/// Resolver answering every A/AAAA question from a fixed table.
pub struct MockDnsResolver {
    answers: Mutex<HashMap<String, IpAddr>>,
    should_fail: bool,
    calls: AtomicUsize,
}

impl MockDnsResolver {
    pub fn new() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            should_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    pub fn with_answer(self, domain: &str, ip: &str) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(domain.to_string(), ip.parse().unwrap());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsResolver for MockDnsResolver {
    async fn exchange(&self, request: &Message) -> Result<Message, TunDnsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(TunDnsError::Resolver("upstream unreachable".to_string()));
        }

        // Deliberately a different id: the handler must restore the request's.
        let mut response = Message::new(0, MessageType::Response, OpCode::Query);
        response.add_queries(request.queries().to_vec());
        let answers = self.answers.lock().unwrap();
        for q in request.queries() {
            let domain = q.name().to_utf8();
            let Some(ip) = answers.get(domain.trim_end_matches('.')) else {
                continue;
            };
            let rdata = match ip {
                IpAddr::V4(v4) => RData::A(A(*v4)),
                IpAddr::V6(v6) => RData::AAAA(AAAA(*v6)),
            };
            response.add_answer(Record::from_rdata(q.name().clone(), 300, rdata));
        }
        Ok(response)
    }
}

/// Enhancer with a sequential fake pool and an in-memory mapping table.
pub struct MockEnhancer {
    fake_ip: bool,
    mapping: bool,
    skipped: Vec<String>,
    next: Mutex<u32>,
    allocated: Mutex<HashMap<String, Ipv4Addr>>,
    pub mappings: Mutex<Vec<(IpAddr, String, u32)>>,
}

impl MockEnhancer {
    pub fn fake_ip() -> Self {
        Self::build(true, false)
    }

    pub fn mapping() -> Self {
        Self::build(false, true)
    }

    pub fn skipping(mut self, host: &str) -> Self {
        self.skipped.push(host.to_string());
        self
    }

    fn build(fake_ip: bool, mapping: bool) -> Self {
        Self {
            fake_ip,
            mapping,
            skipped: Vec::new(),
            next: Mutex::new(1),
            allocated: Mutex::new(HashMap::new()),
            mappings: Mutex::new(Vec::new()),
        }
    }
}

impl ResolverEnhancer for MockEnhancer {
    fn fake_ip_enabled(&self) -> bool {
        self.fake_ip
    }

    fn mapping_enabled(&self) -> bool {
        self.mapping
    }

    fn should_skip(&self, host: &str) -> bool {
        self.skipped.iter().any(|s| s == host)
    }

    fn fake_ip_for(&self, host: &str) -> Option<Ipv4Addr> {
        let mut allocated = self.allocated.lock().unwrap();
        if let Some(ip) = allocated.get(host) {
            return Some(*ip);
        }
        let mut next = self.next.lock().unwrap();
        let ip = Ipv4Addr::from(u32::from(Ipv4Addr::new(198, 18, 0, 0)) + *next);
        *next += 1;
        allocated.insert(host.to_string(), ip);
        Some(ip)
    }

    fn insert_mapping(&self, ip: IpAddr, host: &str, ttl: u32) {
        self.mappings
            .lock()
            .unwrap()
            .push((ip, host.to_string(), ttl));
    }

    fn is_fake_ip(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => v4.octets()[0] == 198 && v4.octets()[1] == 18,
            IpAddr::V6(_) => false,
        }
    }
}

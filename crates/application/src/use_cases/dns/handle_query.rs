use crate::ports::{DnsResolver, ResolverEnhancer};
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

/// TTL of synthesized fake-IP answers. Kept minimal so clients come back
/// through the tun for every lookup.
pub const FAKE_IP_TTL: u32 = 1;

/// Answers DNS requests from a resolver, optionally enhanced with fake-IP
/// synthesis or ip → host mapping.
pub struct DnsQueryHandler {
    resolver: Arc<dyn DnsResolver>,
    mapper: Option<Arc<dyn ResolverEnhancer>>,
}

impl DnsQueryHandler {
    pub fn new(resolver: Arc<dyn DnsResolver>, mapper: Option<Arc<dyn ResolverEnhancer>>) -> Self {
        Self { resolver, mapper }
    }

    pub async fn handle(&self, request: &Message, client: SocketAddr) -> Message {
        let Some(query) = request.queries().first() else {
            debug!(client = %client, "DNS request without question");
            return reply_to(request, ResponseCode::FormErr);
        };

        if let Some(mapper) = self.mapper.as_deref().filter(|m| m.fake_ip_enabled()) {
            if let Some(response) = answer_with_fake_ip(mapper, request, query) {
                return response;
            }
        }

        let mut response = match self.resolver.exchange(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    error = %e,
                    domain = %query.name(),
                    record_type = ?query.query_type(),
                    client = %client,
                    "DNS resolution failed"
                );
                return reply_to(request, ResponseCode::ServFail);
            }
        };
        let mut header = *response.header();
        header.set_id(request.id());
        response.set_header(header);

        if let Some(mapper) = self.mapper.as_deref().filter(|m| m.mapping_enabled()) {
            record_mappings(mapper, &response);
        }

        response
    }
}

fn answer_with_fake_ip(
    mapper: &dyn ResolverEnhancer,
    request: &Message,
    query: &Query,
) -> Option<Message> {
    if request.queries().len() != 1 || query.query_class() != DNSClass::IN {
        return None;
    }

    let host = normalize_host(&query.name().to_utf8());
    if mapper.should_skip(&host) {
        return None;
    }

    match query.query_type() {
        RecordType::A => {
            let ip = mapper.fake_ip_for(&host)?;
            debug!(domain = %host, fake_ip = %ip, "Answering with fake IP");

            let mut response = reply_to(request, ResponseCode::NoError);
            response.add_answer(Record::from_rdata(
                query.name().clone(),
                FAKE_IP_TTL,
                RData::A(A(ip)),
            ));
            Some(response)
        }
        // Fake IPs are IPv4 only; an empty answer steers clients to A.
        RecordType::AAAA => Some(reply_to(request, ResponseCode::NoError)),
        _ => None,
    }
}

fn record_mappings(mapper: &dyn ResolverEnhancer, response: &Message) {
    for record in response.answers() {
        let ip = match record.data() {
            RData::A(a) => IpAddr::V4(a.0),
            RData::AAAA(aaaa) => IpAddr::V6(aaaa.0),
            _ => continue,
        };
        let host = normalize_host(&record.name().to_utf8());
        mapper.insert_mapping(ip, &host, record.ttl());
    }
}

fn normalize_host(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

/// Empty response echoing the request's id and questions.
fn reply_to(request: &Message, code: ResponseCode) -> Message {
    let mut response = Message::new(request.id(), MessageType::Response, OpCode::Query);
    response.set_recursion_desired(request.recursion_desired());
    response.set_recursion_available(true);
    response.set_response_code(code);
    response.add_queries(request.queries().to_vec());
    response
}

use hickory_proto::rr::RecordType;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tundns_application::ports::{DnsResolver, NetStack, TunAdapter};
use tundns_domain::{FullAddress, NetworkProtocol, TunConfig, TunDnsError};
use tundns_infrastructure::netstack::MemoryStack;
use tundns_infrastructure::tun::NetstackTunAdapter;

mod helpers;
use helpers::*;

fn adapter(stack: &Arc<MemoryStack>) -> NetstackTunAdapter {
    NetstackTunAdapter::new(stack.clone(), NIC, "fd://3").unwrap()
}

fn endpoint_unique_id(adapter: &NetstackTunAdapter) -> Option<u64> {
    adapter.with_dns_server(|s| s.endpoint_unique_id())
}

#[tokio::test]
async fn test_dns_disabled_by_default() {
    let stack = stack();
    let adapter = adapter(&stack);

    assert_eq!(adapter.dns_listen(), "");
    assert_eq!(adapter.device_url(), "fd://3");
    assert!(adapter.recreate_dns_server("").is_ok());
    assert_eq!(stack.registered_endpoints(), 0);
}

#[tokio::test]
async fn test_recreate_same_address_is_idempotent() {
    let stack = stack();
    let adapter = adapter(&stack);

    adapter.recreate_dns_server("10.0.0.2:53").unwrap();
    let unique_id = endpoint_unique_id(&adapter);
    assert_eq!(adapter.dns_listen(), "10.0.0.2:53");

    adapter.recreate_dns_server("10.0.0.2:53").unwrap();
    assert_eq!(endpoint_unique_id(&adapter), unique_id);
    assert_eq!(stack.registered_endpoints(), 1);
}

#[tokio::test]
async fn test_recreate_wildcard_is_idempotent() {
    let stack = stack();
    let adapter = adapter(&stack);

    adapter.recreate_dns_server("0.0.0.0:53").unwrap();
    let unique_id = endpoint_unique_id(&adapter);
    assert_eq!(adapter.dns_listen(), "0.0.0.0:53");

    adapter.recreate_dns_server("0.0.0.0:53").unwrap();
    assert_eq!(endpoint_unique_id(&adapter), unique_id);

    adapter.recreate_dns_server("[fd00::2]:53").unwrap();
    assert_eq!(adapter.dns_listen(), "[fd00::2]:53");
    let v6_id = endpoint_unique_id(&adapter);
    adapter.recreate_dns_server("[fd00::2]:53").unwrap();
    assert_eq!(endpoint_unique_id(&adapter), v6_id);
    assert_eq!(stack.registered_endpoints(), 1);
}

#[tokio::test]
async fn test_empty_or_zero_port_disables() {
    let stack = stack();
    let adapter = adapter(&stack);

    adapter.recreate_dns_server("10.0.0.2:53").unwrap();
    adapter.recreate_dns_server("").unwrap();
    assert_eq!(adapter.dns_listen(), "");
    assert_eq!(stack.registered_endpoints(), 0);

    adapter.recreate_dns_server("10.0.0.2:53").unwrap();
    adapter.recreate_dns_server(":0").unwrap();
    assert_eq!(adapter.dns_listen(), "");
    assert_eq!(stack.registered_endpoints(), 0);
    assert!(!stack.has_tcp_listener(FullAddress::new(NIC, Some(addr("10.0.0.2:53").ip()), 53)));
}

#[tokio::test]
async fn test_moving_listener_replaces_registration() {
    let stack = stack();
    let adapter = adapter(&stack);

    adapter.recreate_dns_server("10.0.0.2:53").unwrap();
    adapter.recreate_dns_server("10.0.0.3:5353").unwrap();

    assert_eq!(adapter.dns_listen(), "10.0.0.3:5353");
    let registrations = stack.registrations(tundns_domain::TransportProtocol::Udp);
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].0.local_port, 5353);
}

#[tokio::test]
async fn test_invalid_address_stops_previous_server() {
    let stack = stack();
    let adapter = adapter(&stack);
    adapter.recreate_dns_server("10.0.0.2:53").unwrap();

    let err = adapter.recreate_dns_server("dns.local:53").unwrap_err();
    assert!(matches!(err, TunDnsError::InvalidAddress(_)));
    assert_eq!(adapter.dns_listen(), "");
    assert_eq!(stack.registered_endpoints(), 0);
}

#[tokio::test]
async fn test_tcp_listen_failure_leaves_nothing_registered() {
    let stack = stack();
    let adapter = adapter(&stack);
    let _taken = stack
        .listen_tcp(
            FullAddress::new(NIC, Some(addr("10.0.0.2:53").ip()), 53),
            NetworkProtocol::Ipv4,
        )
        .unwrap();

    let err = adapter.recreate_dns_server("10.0.0.2:53").unwrap_err();
    assert!(matches!(err, TunDnsError::Listen(_)));
    assert_eq!(adapter.dns_listen(), "");
    assert_eq!(stack.registered_endpoints(), 0);
}

#[tokio::test]
async fn test_resolver_set_before_server_is_applied() {
    let stack = stack();
    let adapter = adapter(&stack);
    adapter
        .reset_dns_resolver(Some(StaticResolver::new("93.184.216.34")), None)
        .unwrap();

    adapter.recreate_dns_server("10.0.0.2:53").unwrap();
    assert_eq!(adapter.with_dns_server(|s| s.has_resolver()), Some(true));

    let client = addr("10.0.0.7:40000");
    stack.inject_inbound(
        NIC,
        &udp_packet(
            client,
            addr("10.0.0.2:53"),
            &query_bytes(0x4242, "example.com.", RecordType::A),
        ),
    );

    let reply = next_reply(&stack).await;
    assert_eq!(reply.src, addr("10.0.0.2:53"));
    assert_eq!(reply.dst, client);
    assert_eq!(reply.message().id(), 0x4242);
    assert_eq!(
        first_a(&reply.message()),
        Some(Ipv4Addr::new(93, 184, 216, 34))
    );
}

#[tokio::test]
async fn test_resolver_swap_through_adapter_keeps_endpoint() {
    let stack = stack();
    let adapter = adapter(&stack);
    adapter.recreate_dns_server("10.0.0.2:53").unwrap();
    adapter
        .reset_dns_resolver(Some(StaticResolver::new("1.1.1.1")), None)
        .unwrap();
    let unique_id = endpoint_unique_id(&adapter);

    let second: Arc<dyn DnsResolver> = StaticResolver::new("2.2.2.2");
    adapter.reset_dns_resolver(Some(second), None).unwrap();

    assert_eq!(endpoint_unique_id(&adapter), unique_id);
    assert_eq!(stack.registered_endpoints(), 1);
}

#[tokio::test]
async fn test_missing_resolver() {
    let stack = stack();
    let adapter = adapter(&stack);

    assert!(adapter.reset_dns_resolver(None, None).is_ok());

    adapter.recreate_dns_server("10.0.0.2:53").unwrap();
    let err = adapter.reset_dns_resolver(None, None).unwrap_err();
    assert!(matches!(err, TunDnsError::Config(_)));
}

#[tokio::test]
async fn test_close_stops_dns_server() {
    let stack = stack();
    let adapter = adapter(&stack);
    adapter.recreate_dns_server("10.0.0.2:53").unwrap();

    adapter.close();
    assert_eq!(adapter.dns_listen(), "");
    assert_eq!(stack.registered_endpoints(), 0);
}

#[tokio::test]
async fn test_from_config_starts_dns() {
    let stack = stack();
    let config = TunConfig {
        device_url: "dev://utun9".to_string(),
        dns_listen: "10.0.0.2:53".to_string(),
        ..TunConfig::default()
    };

    let adapter = NetstackTunAdapter::from_config(stack.clone(), &config).unwrap();
    assert_eq!(adapter.device_url(), "dev://utun9");
    assert_eq!(adapter.dns_listen(), "10.0.0.2:53");
    assert_eq!(adapter.nic_id(), NIC);
    assert_eq!(adapter.stack().stats().udp.packets_sent.value(), 0);
}

#[test]
fn test_adapter_requires_runtime() {
    let stack = stack();
    let result = NetstackTunAdapter::new(stack, NIC, "fd://3");
    assert!(matches!(result, Err(TunDnsError::NoRuntime(_))));
}

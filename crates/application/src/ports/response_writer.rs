use crate::dns_message;
use async_trait::async_trait;
use hickory_proto::op::Message;
use std::net::SocketAddr;
use tundns_domain::TunDnsError;

/// Reply channel for one DNS request.
#[async_trait]
pub trait ResponseWriter: Send + Sync {
    fn local_addr(&self) -> SocketAddr;

    fn remote_addr(&self) -> SocketAddr;

    /// Packs `message` and writes it. Nothing is written if packing fails.
    async fn write_msg(&self, message: &Message) -> Result<(), TunDnsError> {
        let bytes = dns_message::pack(message)?;
        self.write(&bytes).await.map(|_| ())
    }

    async fn write(&self, bytes: &[u8]) -> Result<usize, TunDnsError>;

    // TSIG and connection hijacking are not supported on tun.
    fn tsig_status(&self) -> Result<(), TunDnsError> {
        Ok(())
    }

    fn tsig_timers_only(&self, _timers_only: bool) {}

    fn hijack(&self) {}

    fn close(&self) -> Result<(), TunDnsError> {
        Ok(())
    }
}

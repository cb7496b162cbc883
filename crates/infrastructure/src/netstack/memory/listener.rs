use super::ListenerTable;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Weak;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tundns_application::ports::{StackListener, StackStream};
use tundns_domain::{FullAddress, StackError};

pub(super) type Incoming = (DuplexStream, SocketAddr);

pub struct MemoryListener {
    pub(super) address: FullAddress,
    pub(super) incoming: Mutex<mpsc::Receiver<Incoming>>,
    pub(super) closed: CancellationToken,
    pub(super) table: Weak<ListenerTable>,
}

#[async_trait]
impl StackListener for MemoryListener {
    async fn accept(&self) -> Result<(Box<dyn StackStream>, SocketAddr), StackError> {
        let mut incoming = tokio::select! {
            _ = self.closed.cancelled() => return Err(StackError::Closed),
            guard = self.incoming.lock() => guard,
        };
        tokio::select! {
            _ = self.closed.cancelled() => Err(StackError::Closed),
            conn = incoming.recv() => match conn {
                Some((stream, peer)) => Ok((Box::new(stream), peer)),
                None => Err(StackError::Closed),
            },
        }
    }

    fn local_addr(&self) -> FullAddress {
        self.address
    }

    fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        if let Some(table) = self.table.upgrade() {
            table
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&(self.address.nic, self.address.addr, self.address.port));
        }
    }
}

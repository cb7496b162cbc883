use super::service::DnsService;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;
use tundns_application::dns_message;
use tundns_application::ports::{ResponseWriter, StackStream};
use tundns_domain::TunDnsError;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

/// Writes length-prefixed DNS responses on a TCP connection.
pub struct TcpResponseWriter<W> {
    writer: Mutex<W>,
    local: SocketAddr,
    peer: SocketAddr,
}

impl<W> TcpResponseWriter<W> {
    pub fn new(writer: W, local: SocketAddr, peer: SocketAddr) -> Self {
        Self {
            writer: Mutex::new(writer),
            local,
            peer,
        }
    }
}

#[async_trait]
impl<W> ResponseWriter for TcpResponseWriter<W>
where
    W: AsyncWriteExt + Send + Unpin,
{
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn write(&self, bytes: &[u8]) -> Result<usize, TunDnsError> {
        let mut writer = self.writer.lock().await;
        send_with_length_prefix(&mut *writer, bytes).await?;
        Ok(bytes.len())
    }
}

/// Serves requests on one TCP connection, one at a time, until the client
/// closes it, it stays idle too long, or the service shuts down.
pub(crate) async fn serve_connection(
    service: Arc<DnsService>,
    stream: Box<dyn StackStream>,
    local: SocketAddr,
    peer: SocketAddr,
) {
    let (mut reader, writer) = tokio::io::split(stream);
    let writer: Arc<dyn ResponseWriter> = Arc::new(TcpResponseWriter::new(writer, local, peer));
    let idle = service.tcp_idle_timeout();

    loop {
        let frame = tokio::select! {
            _ = service.shutdown_token().cancelled() => break,
            frame = tokio::time::timeout(idle, read_with_length_prefix(&mut reader)) => frame,
        };

        let bytes = match frame {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                debug!(error = %e, client = %peer, "DNS over TCP read failed");
                break;
            }
            Err(_) => {
                debug!(client = %peer, "DNS over TCP connection idle, closing");
                break;
            }
        };

        let request = match dns_message::unpack(&bytes) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, client = %peer, "Dropping undecodable DNS over TCP request");
                continue;
            }
        };

        service.serve_dns(Arc::clone(&writer), request).await;
    }
}

pub(crate) async fn send_with_length_prefix<S>(
    stream: &mut S,
    message_bytes: &[u8],
) -> Result<(), TunDnsError>
where
    S: AsyncWriteExt + Unpin,
{
    let length = u16::try_from(message_bytes.len()).map_err(|_| {
        TunDnsError::Encode(format!(
            "message too large for TCP: {} bytes (max {})",
            message_bytes.len(),
            MAX_TCP_MESSAGE_SIZE
        ))
    })?;

    let mut frame = Vec::with_capacity(2 + message_bytes.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(message_bytes);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one length-prefixed message. `None` on a clean end of stream
/// between messages.
pub(crate) async fn read_with_length_prefix<S>(
    stream: &mut S,
) -> Result<Option<Vec<u8>>, TunDnsError>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let message_len = u16::from_be_bytes(len_buf) as usize;
    let mut message = vec![0u8; message_len];
    stream.read_exact(&mut message).await?;
    Ok(Some(message))
}

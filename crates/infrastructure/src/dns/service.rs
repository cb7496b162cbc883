use super::tcp::serve_connection;
use hickory_proto::op::Message;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tundns_application::ports::{ResponseWriter, StackListener};
use tundns_application::use_cases::DnsQueryHandler;
use tundns_domain::StackError;

const DEFAULT_TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// A DNS server bound to one resolver configuration.
///
/// UDP requests are pushed in through [`DnsService::serve_dns`]; TCP
/// connections are pulled from a stack listener by
/// [`DnsService::activate_and_serve`]. Replacing the resolver means building
/// a new service and shutting this one down.
pub struct DnsService {
    handler: DnsQueryHandler,
    shutdown: CancellationToken,
    tcp_idle_timeout: Duration,
}

impl DnsService {
    pub fn new(handler: DnsQueryHandler) -> Self {
        Self {
            handler,
            shutdown: CancellationToken::new(),
            tcp_idle_timeout: DEFAULT_TCP_IDLE_TIMEOUT,
        }
    }

    pub fn with_tcp_idle_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_idle_timeout = timeout;
        self
    }

    pub fn tcp_idle_timeout(&self) -> Duration {
        self.tcp_idle_timeout
    }

    /// Answers one request through `writer`. Failures are logged; the
    /// client is left to retry.
    pub async fn serve_dns(&self, writer: Arc<dyn ResponseWriter>, request: Message) {
        let response = self.handler.handle(&request, writer.remote_addr()).await;
        if let Err(e) = writer.write_msg(&response).await {
            warn!(
                error = %e,
                client = %writer.remote_addr(),
                id = request.id(),
                "Failed to write DNS response"
            );
        }
    }

    /// Starts accepting DNS-over-TCP connections from `listener` on
    /// `runtime`. The accept loop stops on shutdown or when the listener is
    /// closed; the listener itself is left open.
    pub fn activate_and_serve(
        self: &Arc<Self>,
        runtime: &Handle,
        listener: Arc<dyn StackListener>,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let spawner = runtime.clone();
        runtime.spawn(async move { service.accept_loop(listener, spawner).await })
    }

    async fn accept_loop(self: Arc<Self>, listener: Arc<dyn StackListener>, runtime: Handle) {
        let bound = listener.local_addr();
        let local = SocketAddr::new(
            bound.addr.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            bound.port,
        );
        info!(addr = %local, nic = %bound.nic, "DNS over TCP accepting on tun");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(client = %peer, "DNS over TCP connection accepted");
                    runtime.spawn(serve_connection(Arc::clone(&self), stream, local, peer));
                }
                Err(StackError::Closed) => break,
                Err(e) => {
                    warn!(error = %e, addr = %local, "DNS over TCP accept failed");
                    break;
                }
            }
        }

        debug!(addr = %local, "DNS over TCP accept loop stopped");
    }

    /// Stops the TCP accept loop and open TCP connections. Requests already
    /// being resolved still get their reply.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

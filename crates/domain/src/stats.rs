use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter shared between the stack and its protocol handlers.
#[derive(Debug, Default)]
pub struct StatCounter(AtomicU64);

impl StatCounter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct UdpStats {
    pub packets_received: StatCounter,
    pub packets_sent: StatCounter,
    pub packet_send_errors: StatCounter,
    pub malformed_packets_received: StatCounter,
    /// Datagrams dropped because no more work could be queued for them.
    pub receive_buffer_errors: StatCounter,
}

/// Stack-level counters.
#[derive(Debug, Default)]
pub struct Stats {
    pub udp: UdpStats,
}

//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All atomics use Relaxed ordering intentionally - these are statistical
//! counters only, never used for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Cumulative counters shared across tasks
#[derive(Debug, Default)]
pub struct Metrics {
    // Relay
    handshakes_accepted: AtomicU64,
    handshakes_rejected: AtomicU64,
    messages_forwarded: AtomicU64,
    messages_dropped: AtomicU64,
    // Sensor pipeline
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    states_published: AtomicU64,
    // Shared
    parse_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_handshake_accepted(&self) {
        self.handshakes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_handshake_rejected(&self) {
        self.handshakes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_forwarded(&self) {
        self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_state_published(&self) {
        self.states_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters for reporting
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            handshakes_accepted: self.handshakes_accepted.load(Ordering::Relaxed),
            handshakes_rejected: self.handshakes_rejected.load(Ordering::Relaxed),
            messages_forwarded: self.messages_forwarded.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            states_published: self.states_published.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter snapshot
#[derive(Debug, Clone, Copy)]
pub struct MetricsSummary {
    pub handshakes_accepted: u64,
    pub handshakes_rejected: u64,
    pub messages_forwarded: u64,
    pub messages_dropped: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub states_published: u64,
    pub parse_errors: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            handshakes_accepted = self.handshakes_accepted,
            handshakes_rejected = self.handshakes_rejected,
            messages_forwarded = self.messages_forwarded,
            messages_dropped = self.messages_dropped,
            frames_received = self.frames_received,
            frames_dropped = self.frames_dropped,
            states_published = self.states_published,
            parse_errors = self.parse_errors,
            "metrics_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_message_forwarded();
        metrics.record_message_forwarded();
        metrics.record_message_dropped();

        let summary = metrics.report();
        assert_eq!(summary.messages_forwarded, 2);
        assert_eq!(summary.messages_dropped, 1);
        assert_eq!(summary.frames_received, 0);
    }
}

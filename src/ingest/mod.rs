//! Ingestion: datagram to stored, persisted sample
//!
//! # Architecture
//!
//! ```text
//!  UDP socket ──► TelemetryListener ──► IngestPipeline::decode ──┐
//!                 (receive loop)        (decrypt + parse)        │
//!                                                                ▼
//!                         inline, or IngestWorkerPool keyed by node_id
//!                                                                │
//!                                                                ▼
//!                 IngestPipeline::accept: score if unscored ► store ► persist
//! ```
//!
//! - [`IngestPipeline`] - Per-datagram processing, shared by every thread
//! - [`IngestWorkerPool`] - Optional node-keyed workers; one node always maps
//!   to the same worker, so its samples are scored in arrival order
//! - [`TelemetryListener`] - Binds the socket and runs the receive loop
//! - [`IngestStats`] - Lock-free counters readable while the loop runs
//!
//! # Failure isolation
//!
//! A datagram that fails to decrypt or parse is logged, counted and dropped;
//! the loop continues with the next one. A failed durable write is logged
//! and counted but the sample stays visible in the store. Only binding the
//! socket can fail the gateway, and only at startup.

pub mod listener;
pub mod pipeline;
pub mod worker;

pub use listener::TelemetryListener;
pub use pipeline::{Accepted, IngestPipeline, PersistOutcome};
pub use worker::IngestWorkerPool;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the ingestion path
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    accepted: AtomicU64,
    oversized: AtomicU64,
    codec_errors: AtomicU64,
    parse_errors: AtomicU64,
    scored_at_gateway: AtomicU64,
    persistence_failures: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    /// Datagrams handed to the pipeline
    pub received: u64,
    /// Samples stored
    pub accepted: u64,
    /// Datagrams dropped for exceeding the receive buffer
    pub oversized: u64,
    /// Datagrams dropped by the codec
    pub codec_errors: u64,
    /// Datagrams dropped by the parser
    pub parse_errors: u64,
    /// Samples that arrived unscored and were scored here
    pub scored_at_gateway: u64,
    /// Samples stored in memory whose durable write failed
    pub persistence_failures: u64,
}

impl IngestStatsSnapshot {
    /// Datagrams dropped for any reason
    pub fn dropped(&self) -> u64 {
        self.oversized + self.codec_errors + self.parse_errors
    }

    /// Percentage of received datagrams that were accepted
    pub fn acceptance_rate(&self) -> f64 {
        if self.received == 0 {
            100.0
        } else {
            (self.accepted as f64 / self.received as f64) * 100.0
        }
    }
}

impl IngestStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            oversized: self.oversized.load(Ordering::Relaxed),
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            scored_at_gateway: self.scored_at_gateway.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_oversized(&self) {
        self.oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_codec_error(&self) {
        self.codec_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scored(&self) {
        self.scored_at_gateway.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let stats = IngestStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_received();
        stats.record_accepted();
        stats.record_codec_error();
        stats.record_parse_error();

        let snap = stats.snapshot();
        assert_eq!(snap.received, 3);
        assert_eq!(snap.accepted, 1);
        assert_eq!(snap.dropped(), 2);
        assert!((snap.acceptance_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_acceptance_rate() {
        assert_eq!(IngestStatsSnapshot::default().acceptance_rate(), 100.0);
    }
}

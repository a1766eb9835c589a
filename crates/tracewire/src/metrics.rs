//! Export pipeline counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one exporter's pipeline.
///
/// Relaxed ordering throughout: these are statistics and guard no other
/// data.
#[derive(Debug, Default)]
pub struct ExportMetrics {
    traces_recorded: AtomicU64,
    traces_dropped: AtomicU64,
    reports_sent: AtomicU64,
    reports_failed: AtomicU64,
}

impl ExportMetrics {
    /// Counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Traces accepted into the queue.
    pub fn traces_recorded(&self) -> u64 {
        self.traces_recorded.load(Ordering::Relaxed)
    }

    /// Traces rejected because the queue was at its byte bound.
    pub fn traces_dropped(&self) -> u64 {
        self.traces_dropped.load(Ordering::Relaxed)
    }

    /// Reports the sink delivered.
    pub fn reports_sent(&self) -> u64 {
        self.reports_sent.load(Ordering::Relaxed)
    }

    /// Reports abandoned after the sink gave up.
    pub fn reports_failed(&self) -> u64 {
        self.reports_failed.load(Ordering::Relaxed)
    }

    pub(crate) fn record_trace_recorded(&self) {
        self.traces_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_trace_dropped(&self) {
        self.traces_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_report_sent(&self) {
        self.reports_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_report_failed(&self) {
        self.reports_failed.fetch_add(1, Ordering::Relaxed);
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe pipeline counters (uses atomics).
///
/// Shared between the producer side, the consumer task, and concurrent
/// export tasks; every update is a relaxed fetch-add, so observing a
/// snapshot never blocks the hot path.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Chunks that failed header validation and were skipped
    pub frames_rejected: AtomicU64,
    /// Records accepted into a batch queue
    pub records_enqueued: AtomicU64,
    /// Records dropped on overflow or decode failure
    pub records_dropped: AtomicU64,
    /// Batches handed to the transport and accepted
    pub batches_exported: AtomicU64,
    /// Batches handed to the transport that failed delivery
    pub export_errors: AtomicU64,
}

impl PipelineMetrics {
    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected.load(Ordering::Relaxed)
    }

    pub fn records_enqueued(&self) -> u64 {
        self.records_enqueued.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    pub fn batches_exported(&self) -> u64 {
        self.batches_exported.load(Ordering::Relaxed)
    }

    pub fn export_errors(&self) -> u64 {
        self.export_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn record_enqueued(&self) {
        self.records_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, count: u64) {
        self.records_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_export(&self, result: &Result<(), crate::exporter::ExportError>) {
        match result {
            Ok(()) => self.batches_exported.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.export_errors.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn record_rejected_frame(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }
}

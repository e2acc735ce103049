use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    documents_failed: AtomicU64,
    chunks_processed: AtomicU64,
    completion_calls: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document written successfully, with its chunk and call counts.
    pub fn record_success(&self, chunk_count: u64, completion_calls: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_processed
            .fetch_add(chunk_count, Ordering::Relaxed);
        self.completion_calls
            .fetch_add(completion_calls, Ordering::Relaxed);
    }

    /// Record an invocation that ended in a 500 result.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            completion_calls: self.completion_calls.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents transformed and written since startup.
    pub documents_processed: u64,
    /// Invocations that failed before a result was written.
    pub documents_failed: u64,
    /// Total chunks produced across successful documents.
    pub chunks_processed: u64,
    /// Completion calls issued for successful documents.
    pub completion_calls: u64,
}

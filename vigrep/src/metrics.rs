use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Counters describing how much of each container was actually read and
/// decoded. Clones share the same counters.
#[derive(Debug, Clone)]
pub struct ScanMetrics {
    files_processed: Arc<AtomicU64>,

    // Byte accounting
    bytes_loaded: Arc<AtomicU64>,
    bytes_skipped: Arc<AtomicU64>,

    // Section outcomes
    sections_decoded: Arc<AtomicU64>,
    sections_failed: Arc<AtomicU64>,
    sections_without_heap: Arc<AtomicU64>,

    // Text extraction
    text_objects: Arc<AtomicU64>,
    text_decode_failures: Arc<AtomicU64>,
}

impl ScanMetrics {
    /// Creates a new ScanMetrics instance
    pub fn new() -> Self {
        Self {
            files_processed: Arc::new(AtomicU64::new(0)),
            bytes_loaded: Arc::new(AtomicU64::new(0)),
            bytes_skipped: Arc::new(AtomicU64::new(0)),
            sections_decoded: Arc::new(AtomicU64::new(0)),
            sections_failed: Arc::new(AtomicU64::new(0)),
            sections_without_heap: Arc::new(AtomicU64::new(0)),
            text_objects: Arc::new(AtomicU64::new(0)),
            text_decode_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_file_processed(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records section bytes read from a container
    pub fn record_bytes_loaded(&self, bytes: u64) {
        self.bytes_loaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records declared block bytes that were left on disk
    pub fn record_bytes_skipped(&self, bytes: u64) {
        self.bytes_skipped.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_section_decoded(&self) {
        self.sections_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_section_failed(&self) {
        self.sections_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_section_without_heap(&self) {
        self.sections_without_heap.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_text_object(&self) {
        self.text_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_text_decode_failure(&self) {
        self.text_decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets a snapshot of the counters
    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            bytes_loaded: self.bytes_loaded.load(Ordering::Relaxed),
            bytes_skipped: self.bytes_skipped.load(Ordering::Relaxed),
            sections_decoded: self.sections_decoded.load(Ordering::Relaxed),
            sections_failed: self.sections_failed.load(Ordering::Relaxed),
            sections_without_heap: self.sections_without_heap.load(Ordering::Relaxed),
            text_objects: self.text_objects.load(Ordering::Relaxed),
            text_decode_failures: self.text_decode_failures.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters
    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Scan stats:\n\
             Files processed: {}\n\
             Bytes loaded/skipped: {}/{}\n\
             Sections decoded/failed/without heap: {}/{}/{}\n\
             Text objects: {} ({} not decodable)",
            stats.files_processed,
            stats.bytes_loaded,
            stats.bytes_skipped,
            stats.sections_decoded,
            stats.sections_failed,
            stats.sections_without_heap,
            stats.text_objects,
            stats.text_decode_failures
        );
    }
}

impl Default for ScanMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`ScanMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub files_processed: u64,
    pub bytes_loaded: u64,
    pub bytes_skipped: u64,
    pub sections_decoded: u64,
    pub sections_failed: u64,
    pub sections_without_heap: u64,
    pub text_objects: u64,
    pub text_decode_failures: u64,
}

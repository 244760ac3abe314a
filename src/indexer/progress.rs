use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;

/// Shared counters a running build updates and any thread may poll.
#[derive(Clone, Default)]
pub struct IndexingProgress {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    files_total: AtomicUsize,
    files_processed: AtomicUsize,
    occurrences_stored: AtomicUsize,
    errors: AtomicUsize,
    is_active: AtomicBool,
    phase: Mutex<String>,
    started_at: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub is_active: bool,
    pub phase: String,
    pub files_total: usize,
    pub files_processed: usize,
    pub occurrences_stored: usize,
    pub errors: usize,
    pub elapsed_ms: u64,
    pub progress_pct: f64,
    pub eta_ms: Option<u64>,
}

impl ProgressSnapshot {
    /// One-line status, e.g. `Indexing 12/40 (30%)`.
    pub fn status_line(&self) -> String {
        if !self.is_active {
            return String::new();
        }
        if self.files_total == 0 {
            return self.phase.clone();
        }
        format!(
            "{} {}/{} ({:.0}%)",
            self.phase, self.files_processed, self.files_total, self.progress_pct
        )
    }
}

impl IndexingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the progress active with an unknown total, e.g. while searching.
    pub fn begin_phase(&self, phase: &str) {
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase.to_string();
        self.inner.is_active.store(true, Ordering::Release);
    }

    pub fn start(&self, total_files: usize) {
        self.inner.files_total.store(total_files, Ordering::Release);
        self.inner.files_processed.store(0, Ordering::Release);
        self.inner.occurrences_stored.store(0, Ordering::Release);
        self.inner.errors.store(0, Ordering::Release);
        self.inner.is_active.store(true, Ordering::Release);
        *self
            .inner
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn inc(&self, files: usize, occurrences: usize) {
        self.inner.files_processed.fetch_add(files, Ordering::Relaxed);
        self.inner
            .occurrences_stored
            .fetch_add(occurrences, Ordering::Relaxed);
    }

    pub fn inc_error(&self, files: usize) {
        self.inner.files_processed.fetch_add(files, Ordering::Relaxed);
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.inner.is_active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let is_active = self.inner.is_active.load(Ordering::Acquire);
        let files_total = self.inner.files_total.load(Ordering::Acquire);
        let files_processed = self.inner.files_processed.load(Ordering::Acquire);
        let occurrences_stored = self.inner.occurrences_stored.load(Ordering::Acquire);
        let errors = self.inner.errors.load(Ordering::Acquire);
        let phase = self
            .inner
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let elapsed_ms = self
            .inner
            .started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let progress_pct = if files_total > 0 {
            (files_processed.min(files_total) as f64 / files_total as f64) * 100.0
        } else {
            0.0
        };

        let eta_ms = if is_active && files_processed > 0 && files_processed < files_total {
            let remaining = files_total - files_processed;
            let ms_per_file = elapsed_ms as f64 / files_processed as f64;
            Some((remaining as f64 * ms_per_file) as u64)
        } else {
            None
        };

        ProgressSnapshot {
            is_active,
            phase,
            files_total,
            files_processed,
            occurrences_stored,
            errors,
            elapsed_ms,
            progress_pct,
            eta_ms,
        }
    }
}

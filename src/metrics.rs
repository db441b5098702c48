// Build metrics module
//
// Lightweight counters describing what builds did, logged as a summary at the end

use crate::patching::{FileAction, PatchReport};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters for one process run.
///
/// Uses atomic operations so a shared reference can be handed to every component.
#[derive(Debug)]
pub struct BuildMetrics {
    /// Modules whose `apply` succeeded
    pub modules_applied: AtomicUsize,

    /// Modules whose `apply` failed
    pub modules_failed: AtomicUsize,

    /// Numeric literals rewritten
    pub fields_patched: AtomicUsize,

    /// Fields with no occurrence in scope
    pub fields_missing: AtomicUsize,

    /// Text sources edited in place
    pub files_merged: AtomicUsize,

    /// Files written from templates or generated from scratch
    pub files_synthesized: AtomicUsize,

    pub builds_succeeded: AtomicUsize,
    pub builds_failed: AtomicUsize,

    /// Time spent in the packer, in milliseconds
    pub total_pack_time_ms: AtomicU64,

    start_time: Instant,
}

impl BuildMetrics {
    pub fn new() -> Self {
        Self {
            modules_applied: AtomicUsize::new(0),
            modules_failed: AtomicUsize::new(0),
            fields_patched: AtomicUsize::new(0),
            fields_missing: AtomicUsize::new(0),
            files_merged: AtomicUsize::new(0),
            files_synthesized: AtomicUsize::new(0),
            builds_succeeded: AtomicUsize::new(0),
            builds_failed: AtomicUsize::new(0),
            total_pack_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a successful module application and everything it touched
    pub fn record_patch(&self, report: &PatchReport) {
        self.modules_applied.fetch_add(1, Ordering::Relaxed);
        self.fields_patched
            .fetch_add(report.fields_patched, Ordering::Relaxed);
        self.fields_missing
            .fetch_add(report.fields_missing(), Ordering::Relaxed);
        self.files_merged
            .fetch_add(report.count(FileAction::Merged), Ordering::Relaxed);
        self.files_synthesized.fetch_add(
            report.count(FileAction::Synthesized) + report.count(FileAction::Generated),
            Ordering::Relaxed,
        );
    }

    pub fn record_module_failed(&self) {
        self.modules_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_succeeded(&self) {
        self.builds_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pack_time(&self, duration: Duration) {
        self.total_pack_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Build Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Builds: {} succeeded, {} failed",
            self.builds_succeeded.load(Ordering::Relaxed),
            self.builds_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Modules: {} applied, {} failed",
            self.modules_applied.load(Ordering::Relaxed),
            self.modules_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Fields: {} patched, {} not found",
            self.fields_patched.load(Ordering::Relaxed),
            self.fields_missing.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Files: {} merged, {} synthesized",
            self.files_merged.load(Ordering::Relaxed),
            self.files_synthesized.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Packing time: {:.2}s",
            self.total_pack_time_ms.load(Ordering::Relaxed) as f64 / 1000.0
        );
    }
}

impl Default for BuildMetrics {
    fn default() -> Self {
        Self::new()
    }
}

//! Progress tracking and throttling for a scan run.
//!
//! The tracker decides how much work each chunk's progress update deserves:
//! nothing while the whole-percent value is unchanged, a listener
//! notification when it moves, and a full persist (snapshot, checkpoint and
//! remote sync) when it lands on a multiple of five. It also counts chunks,
//! matches and chunk faults for the end-of-run summary.

use crate::utils::{format_gigabytes, format_percent};

use tracing::{info, warn};

/// Percent step at which a progress change triggers a full persist.
const PERSIST_STEP: i64 = 5;

/// Percent step at which progress is logged.
const LOG_STEP: i64 = 10;

/// What the orchestrator should do with a progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    /// Whole-percent value unchanged.
    None,
    /// Update the in-memory state and notify listeners.
    Notify,
    /// As `Notify`, plus snapshot, checkpoint and remote sync.
    Persist,
}

/// Service for tracking scan progress
#[derive(Debug, Clone)]
pub struct ScanProgressTracker {
    /// Byte offset the run started from
    start_bytes: u64,
    /// Highest byte offset reached
    bytes_processed: u64,
    chunks_processed: u64,
    chunk_errors: u64,
    matches_found: u64,
    /// Last whole percent handed to listeners, -1 before the first update
    last_notified_percent: i64,
    /// Last whole percent written to the log
    last_logged_percent: i64,
    /// Emit a warning every N chunk errors
    error_warn_every: u64,
}

impl ScanProgressTracker {
    pub fn new(start_bytes: u64, error_warn_every: u64) -> Self {
        Self {
            start_bytes,
            bytes_processed: start_bytes,
            chunks_processed: 0,
            chunk_errors: 0,
            matches_found: 0,
            last_notified_percent: -1,
            last_logged_percent: -1,
            error_warn_every: error_warn_every.max(1),
        }
    }

    /// Record a chunk that was read and scanned.
    pub fn record_chunk(&mut self, chunk_end: u64, matches: usize) {
        self.bytes_processed = self.bytes_processed.max(chunk_end);
        self.chunks_processed += 1;
        self.matches_found += matches as u64;
    }

    /// Record a chunk that could not be read. The chunk is skipped, so the
    /// offset still advances.
    pub fn record_chunk_error(&mut self, chunk_end: u64) {
        self.bytes_processed = self.bytes_processed.max(chunk_end);
        self.chunk_errors += 1;

        if self.chunk_errors % self.error_warn_every == 0 {
            warn!(
                chunk_errors = self.chunk_errors,
                "Scan has skipped {} unreadable chunks so far", self.chunk_errors
            );
        }
    }

    /// Throttle decision for the given progress value.
    pub fn observe(&mut self, progress: f64) -> ProgressAction {
        let percent = progress.floor() as i64;
        if percent <= self.last_notified_percent {
            return ProgressAction::None;
        }

        self.last_notified_percent = percent;
        if percent % PERSIST_STEP == 0 {
            ProgressAction::Persist
        } else {
            ProgressAction::Notify
        }
    }

    /// Log progress each time a 10% boundary is crossed, or when forced.
    pub fn log_progress(&mut self, progress: f64, file_size: u64, force: bool) {
        let decile = (progress.floor() as i64 / LOG_STEP) * LOG_STEP;
        if !force && decile <= self.last_logged_percent {
            return;
        }
        self.last_logged_percent = decile;

        info!(
            progress = %format_percent(progress),
            "Scan progress: {} of {} processed, {} matches, {} chunk errors",
            format_gigabytes(self.bytes_processed),
            format_gigabytes(file_size),
            self.matches_found,
            self.chunk_errors
        );
    }

    pub fn get_stats(&self) -> ScanStats {
        ScanStats {
            start_bytes: self.start_bytes,
            bytes_processed: self.bytes_processed,
            chunks_processed: self.chunks_processed,
            chunk_errors: self.chunk_errors,
            matches_found: self.matches_found,
        }
    }
}

/// Statistics about a scan run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub start_bytes: u64,
    pub bytes_processed: u64,
    pub chunks_processed: u64,
    pub chunk_errors: u64,
    pub matches_found: u64,
}

impl ScanStats {
    /// Get a human-readable summary of the scan statistics
    pub fn summary(&self) -> String {
        format!(
            "Scan from byte {} to {}: {} chunks, {} matches{}",
            self.start_bytes,
            self.bytes_processed,
            self.chunks_processed,
            self.matches_found,
            if self.chunk_errors == 0 {
                String::new()
            } else {
                format!(" ({} chunks skipped)", self.chunk_errors)
            }
        )
    }
}

//! State persistence service for scan runs.
//!
//! This module provides the `StatePersistenceService`, which owns the local
//! side of persistence: throttled checkpoint writes with retention, the
//! single state snapshot slot, and file metadata. It works through the
//! repository traits in `crate::storage`, so the orchestrator never touches
//! files directly.
//!
//! Checkpoints are written at most once per `min_interval` unless forced, are
//! never written with non-finite numbers, and are pruned to `keep_count` per
//! file after every successful write.

use crate::scan::types::{
    CheckpointStatus, ProcessingCheckpoint, ProcessingState, ScanError,
};
use crate::storage::{
    CheckpointRepository, DEFAULT_KEEP_CHECKPOINTS, FileChunk, FileMetadata,
    StateSnapshotRepository, StorageStats,
};
use crate::utils::{format_percent, lock, now_millis};

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Configuration for checkpoint saving.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Minimum spacing between two unforced checkpoint writes.
    pub min_interval: Duration,
    /// Period of the background auto-checkpoint task.
    pub auto_interval: Duration,
    /// Number of checkpoints to keep per file.
    pub keep_count: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(25),
            auto_interval: Duration::from_secs(30),
            keep_count: DEFAULT_KEEP_CHECKPOINTS,
        }
    }
}

/// Result of a checkpoint request.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointOutcome {
    Written(ProcessingCheckpoint),
    /// Too soon after the previous write.
    Throttled,
    /// The state was not valid for a checkpoint.
    Skipped,
    /// The store rejected the write. Already logged.
    Failed,
}

#[derive(Debug, Default)]
struct CheckpointClock {
    last_write: Option<Instant>,
    last_timestamp: i64,
}

/// Service for managing local persistence operations.
pub struct StatePersistenceService {
    checkpoint_repo: Arc<dyn CheckpointRepository>,
    snapshot_repo: Arc<dyn StateSnapshotRepository>,
    config: CheckpointConfig,
    clock: Mutex<CheckpointClock>,
}

impl StatePersistenceService {
    pub fn new(
        checkpoint_repo: Arc<dyn CheckpointRepository>,
        snapshot_repo: Arc<dyn StateSnapshotRepository>,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            checkpoint_repo,
            snapshot_repo,
            config,
            clock: Mutex::new(CheckpointClock::default()),
        }
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Forget the previous write time so the next checkpoint of a new run is
    /// not throttled by the last run.
    pub fn reset_checkpoint_clock(&self) {
        lock(&self.clock).last_write = None;
    }

    /// Claim a checkpoint slot. Returns the timestamp to use, or `None` when
    /// throttled. Timestamps strictly increase so ids never collide.
    fn claim_slot(&self, force: bool) -> Option<i64> {
        let mut clock = lock(&self.clock);
        let now = Instant::now();

        if !force {
            if let Some(last) = clock.last_write {
                if now.duration_since(last) < self.config.min_interval {
                    return None;
                }
            }
        }

        let timestamp = now_millis().max(clock.last_timestamp + 1);
        clock.last_write = Some(now);
        clock.last_timestamp = timestamp;
        Some(timestamp)
    }

    /// Write a checkpoint for `state` subject to throttling, then prune old
    /// checkpoints for the file. Failures are logged, never returned.
    pub async fn checkpoint(&self, state: &ProcessingState, force: bool) -> CheckpointOutcome {
        let Some(timestamp) = self.claim_slot(force) else {
            return CheckpointOutcome::Throttled;
        };

        let Some(checkpoint) = ProcessingCheckpoint::from_state(state, timestamp) else {
            warn!(
                file_hash = %state.file_hash,
                "Invalid processing state, checkpoint not written"
            );
            return CheckpointOutcome::Skipped;
        };

        if let Err(e) = self.checkpoint_repo.save_checkpoint(&checkpoint).await {
            error!("Failed to save checkpoint {}: {}", checkpoint.id, e);
            return CheckpointOutcome::Failed;
        }

        info!(
            progress = %format_percent(checkpoint.progress),
            bytes = checkpoint.bytes_processed,
            "Checkpoint saved"
        );

        if let Err(e) = self
            .checkpoint_repo
            .prune_old_checkpoints(&checkpoint.file_hash, self.config.keep_count)
            .await
        {
            warn!("Failed to prune old checkpoints: {}", e);
        }

        CheckpointOutcome::Written(checkpoint)
    }

    /// Newest checkpoint for a file, by timestamp.
    pub async fn load_last_checkpoint(
        &self,
        file_hash: &str,
    ) -> Result<Option<ProcessingCheckpoint>, ScanError> {
        Ok(self.checkpoint_repo.get_last_checkpoint(file_hash).await?)
    }

    /// Checkpoint a new run should resume from: among the unfinished
    /// checkpoints written after the newest completed one, the one with the
    /// most bytes processed (newest on ties).
    pub async fn load_resume_checkpoint(
        &self,
        file_hash: &str,
    ) -> Result<Option<ProcessingCheckpoint>, ScanError> {
        let checkpoints: Vec<ProcessingCheckpoint> = self
            .checkpoint_repo
            .list_checkpoints(file_hash)
            .await?
            .into_iter()
            .filter(ProcessingCheckpoint::is_valid)
            .collect();

        let completed_at = checkpoints
            .iter()
            .filter(|c| c.status == CheckpointStatus::Completed)
            .map(|c| c.timestamp)
            .max();

        Ok(checkpoints
            .into_iter()
            .filter(|c| c.status != CheckpointStatus::Completed)
            .filter(|c| completed_at.map_or(true, |done| c.timestamp > done))
            .max_by_key(|c| (c.bytes_processed, c.timestamp)))
    }

    pub async fn delete_checkpoints(&self, file_hash: &str) -> Result<(), ScanError> {
        Ok(self.checkpoint_repo.delete_checkpoints(file_hash).await?)
    }

    pub async fn save_snapshot(&self, state: &ProcessingState) -> Result<(), ScanError> {
        Ok(self.snapshot_repo.save(state).await?)
    }

    pub async fn load_snapshot(&self) -> Result<Option<ProcessingState>, ScanError> {
        Ok(self.snapshot_repo.load().await?)
    }

    pub async fn clear_snapshot(&self) -> Result<(), ScanError> {
        Ok(self.snapshot_repo.clear().await?)
    }

    /// Record or refresh the metadata entry for the scanned file. With
    /// `chunks_stored == None` the previously recorded count is kept.
    pub async fn save_metadata(
        &self,
        state: &ProcessingState,
        chunks_stored: Option<u64>,
    ) -> Result<(), ScanError> {
        let now = Utc::now();
        let previous = self.checkpoint_repo.get_metadata(&state.file_hash).await?;

        let metadata = FileMetadata {
            file_hash: state.file_hash.clone(),
            file_name: state.file_name.clone(),
            file_size: state.file_size,
            total_chunks: state.total_chunks,
            chunks_stored: chunks_stored
                .or(previous.as_ref().map(|m| m.chunks_stored))
                .unwrap_or(0),
            created_at: previous.map(|m| m.created_at).unwrap_or(now),
            last_accessed: now,
        };
        Ok(self.checkpoint_repo.save_metadata(&metadata).await?)
    }

    /// Copy one scanned chunk into the chunk cache.
    pub async fn cache_chunk(
        &self,
        file_hash: &str,
        chunk_index: u64,
        data: Vec<u8>,
    ) -> Result<(), ScanError> {
        let chunk = FileChunk {
            file_hash: file_hash.to_string(),
            chunk_index,
            size: data.len() as u64,
            data,
            timestamp: now_millis(),
            processed: true,
        };
        Ok(self.checkpoint_repo.save_chunk(&chunk).await?)
    }

    pub async fn delete_cached_chunks(&self, file_hash: &str) -> Result<(), ScanError> {
        Ok(self.checkpoint_repo.delete_file_chunks(file_hash).await?)
    }

    /// Drop every checkpoint, metadata entry and cached chunk.
    pub async fn clear_all(&self) -> Result<(), ScanError> {
        Ok(self.checkpoint_repo.clear_all().await?)
    }

    pub async fn stats(&self) -> Result<StorageStats, ScanError> {
        Ok(self.checkpoint_repo.stats().await?)
    }
}

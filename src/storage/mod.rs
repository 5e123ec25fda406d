//! Local persistence for scan checkpoints and state snapshots.
//!
//! Two repository traits abstract where the data lives:
//!
//! - `CheckpointRepository`: per-file checkpoints (newest-first, capped), file
//!   metadata and an optional raw chunk cache.
//! - `StateSnapshotRepository`: a single slot holding the last known
//!   `ProcessingState`, read back on start-up.
//!
//! `file` stores JSON documents under a data directory. `memory` keeps
//! everything in process and is used in tests.

use crate::scan::types::{ProcessingCheckpoint, ProcessingState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON documents on disk
pub mod file;
/// In-process maps
pub mod memory;

pub use file::{FileCheckpointStore, FileStateSnapshotStore};
pub use memory::{MemoryCheckpointStore, MemoryStateSnapshotStore};

/// Number of checkpoints retained per file by default.
pub const DEFAULT_KEEP_CHECKPOINTS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("Not found: {0}")]
	NotFound(String),
}

/// Bookkeeping for a scanned file, used for storage reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
	pub file_hash: String,
	pub file_name: String,
	pub file_size: u64,
	pub total_chunks: u64,
	pub chunks_stored: u64,
	pub created_at: DateTime<Utc>,
	pub last_accessed: DateTime<Utc>,
}

/// A raw chunk kept in the optional chunk cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChunk {
	pub file_hash: String,
	pub chunk_index: u64,
	#[serde(skip)]
	pub data: Vec<u8>,
	pub size: u64,
	pub timestamp: i64,
	pub processed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageUsage {
	pub used: u64,
	pub available: u64,
	/// Percent of `available` in use, rounded to two decimals.
	pub percentage: f64,
}

impl StorageUsage {
	pub fn new(used: u64, available: u64) -> Self {
		let percentage = if available > 0 {
			(used as f64 / available as f64 * 10_000.0).round() / 100.0
		} else {
			0.0
		};
		Self {
			used,
			available,
			percentage,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageStats {
	pub total_chunks: u64,
	pub total_checkpoints: u64,
	pub total_files: u64,
	pub storage_usage: StorageUsage,
}

/// Repository for checkpoints, file metadata and cached chunks
#[async_trait::async_trait]
pub trait CheckpointRepository: Send + Sync {
	/// Insert or replace a checkpoint by id.
	async fn save_checkpoint(&self, checkpoint: &ProcessingCheckpoint) -> Result<(), StorageError>;

	/// Newest checkpoint for a file, by timestamp.
	async fn get_last_checkpoint(
		&self,
		file_hash: &str,
	) -> Result<Option<ProcessingCheckpoint>, StorageError>;

	/// All retained checkpoints for a file, newest first.
	async fn list_checkpoints(&self, file_hash: &str)
	-> Result<Vec<ProcessingCheckpoint>, StorageError>;

	/// Keep the `keep` newest checkpoints for a file and delete the rest.
	async fn prune_old_checkpoints(&self, file_hash: &str, keep: usize) -> Result<(), StorageError>;

	async fn delete_checkpoints(&self, file_hash: &str) -> Result<(), StorageError>;

	async fn save_metadata(&self, metadata: &FileMetadata) -> Result<(), StorageError>;

	async fn get_metadata(&self, file_hash: &str) -> Result<Option<FileMetadata>, StorageError>;

	async fn save_chunk(&self, chunk: &FileChunk) -> Result<(), StorageError>;

	async fn get_chunk(
		&self,
		file_hash: &str,
		chunk_index: u64,
	) -> Result<Option<FileChunk>, StorageError>;

	/// Cached chunks for a file, ordered by index.
	async fn get_file_chunks(&self, file_hash: &str) -> Result<Vec<FileChunk>, StorageError>;

	async fn delete_file_chunks(&self, file_hash: &str) -> Result<(), StorageError>;

	/// Best-effort usage figures. Never fails; zeros mean unknown.
	async fn storage_usage(&self) -> StorageUsage;

	async fn stats(&self) -> Result<StorageStats, StorageError>;

	async fn clear_all(&self) -> Result<(), StorageError>;
}

/// Repository for the single last-known state slot
#[async_trait::async_trait]
pub trait StateSnapshotRepository: Send + Sync {
	async fn save(&self, state: &ProcessingState) -> Result<(), StorageError>;
	async fn load(&self) -> Result<Option<ProcessingState>, StorageError>;
	async fn clear(&self) -> Result<(), StorageError>;
}

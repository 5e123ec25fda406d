use super::{
	CheckpointRepository, FileChunk, FileMetadata, StateSnapshotRepository, StorageError,
	StorageStats, StorageUsage,
};
use crate::scan::types::{ProcessingCheckpoint, ProcessingState};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const CHECKPOINTS_DIR: &str = "checkpoints";
const METADATA_DIR: &str = "metadata";
const CHUNKS_DIR: &str = "chunks";
const SNAPSHOT_FILE: &str = "processing_state.json";

/// Make a hash or id safe to use as a single path component.
fn sanitize(name: &str) -> String {
	name.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
				c
			} else {
				'_'
			}
		})
		.collect()
}

/// Write `bytes` to `path` through a temp file in the same directory, then
/// rename it into place.
async fn write_atomic(path: PathBuf, bytes: Vec<u8>) -> Result<(), StorageError> {
	tokio::task::spawn_blocking(move || -> std::io::Result<()> {
		let parent = path.parent().unwrap_or_else(|| Path::new("."));
		std::fs::create_dir_all(parent)?;

		let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
		temp_file.write_all(&bytes)?;
		temp_file.flush()?;
		temp_file.as_file().sync_all()?;
		temp_file.persist(&path).map_err(|e| e.error)?;
		Ok(())
	})
	.await
	.map_err(std::io::Error::other)??;

	Ok(())
}

async fn write_json<T: Serialize>(path: PathBuf, value: &T) -> Result<(), StorageError> {
	let content = serde_json::to_vec_pretty(value)?;
	write_atomic(path, content).await
}

/// Read and parse a JSON document. A missing file is `None`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
	match tokio::fs::read(path).await {
		Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e.into()),
	}
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), StorageError> {
	match tokio::fs::remove_dir_all(path).await {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e.into()),
	}
}

/// Paths of the entries directly inside `dir`. A missing directory is empty.
async fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
	let mut entries = match tokio::fs::read_dir(dir).await {
		Ok(entries) => entries,
		Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => return Err(e.into()),
	};

	let mut paths = Vec::new();
	while let Some(entry) = entries.next_entry().await? {
		paths.push(entry.path());
	}
	Ok(paths)
}

/// Count regular files under `root` whose name ends with `suffix`.
fn count_files(root: &Path, suffix: &str) -> u64 {
	WalkDir::new(root)
		.follow_links(false)
		.into_iter()
		.filter_map(Result::ok)
		.filter(|e| e.file_type().is_file())
		.filter(|e| e.file_name().to_string_lossy().ends_with(suffix))
		.count() as u64
}

/// Total bytes of regular files under `root`.
fn directory_size(root: &Path) -> u64 {
	WalkDir::new(root)
		.follow_links(false)
		.into_iter()
		.filter_map(Result::ok)
		.filter(|e| e.file_type().is_file())
		.filter_map(|e| e.metadata().ok())
		.map(|m| m.len())
		.sum()
}

/// File-based implementation of CheckpointRepository
///
/// Layout under the data directory:
///
/// ```text
/// checkpoints/<file hash>/<checkpoint id>.json
/// metadata/<file hash>.json
/// chunks/<file hash>/<index>.bin
/// chunks/<file hash>/<index>.meta.json
/// ```
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
	data_dir: PathBuf,
	quota: Option<u64>,
}

impl FileCheckpointStore {
	pub fn new(data_dir: impl Into<PathBuf>) -> Self {
		Self {
			data_dir: data_dir.into(),
			quota: None,
		}
	}

	/// Report usage against a fixed byte budget.
	pub fn with_quota(mut self, quota: u64) -> Self {
		self.quota = Some(quota);
		self
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	fn checkpoint_dir(&self, file_hash: &str) -> PathBuf {
		self.data_dir.join(CHECKPOINTS_DIR).join(sanitize(file_hash))
	}

	fn checkpoint_path(&self, checkpoint: &ProcessingCheckpoint) -> PathBuf {
		self.checkpoint_dir(&checkpoint.file_hash)
			.join(format!("{}.json", sanitize(&checkpoint.id)))
	}

	fn metadata_path(&self, file_hash: &str) -> PathBuf {
		self.data_dir
			.join(METADATA_DIR)
			.join(format!("{}.json", sanitize(file_hash)))
	}

	fn chunk_dir(&self, file_hash: &str) -> PathBuf {
		self.data_dir.join(CHUNKS_DIR).join(sanitize(file_hash))
	}

	fn chunk_paths(&self, file_hash: &str, chunk_index: u64) -> (PathBuf, PathBuf) {
		let dir = self.chunk_dir(file_hash);
		(
			dir.join(format!("{}.bin", chunk_index)),
			dir.join(format!("{}.meta.json", chunk_index)),
		)
	}

	/// Checkpoint files for a hash paired with their parsed contents.
	/// Unreadable files are skipped with a warning.
	async fn load_checkpoints(
		&self,
		file_hash: &str,
	) -> Result<Vec<(PathBuf, ProcessingCheckpoint)>, StorageError> {
		let mut checkpoints = Vec::new();

		for path in list_dir(&self.checkpoint_dir(file_hash)).await? {
			if path.extension().and_then(|e| e.to_str()) != Some("json") {
				continue;
			}
			match read_json::<ProcessingCheckpoint>(&path).await {
				Ok(Some(checkpoint)) => checkpoints.push((path, checkpoint)),
				Ok(None) => {}
				Err(e) => warn!("Skipping unreadable checkpoint {:?}: {}", path, e),
			}
		}

		checkpoints.sort_by_key(|(_, c)| std::cmp::Reverse(c.timestamp));
		Ok(checkpoints)
	}
}

#[async_trait::async_trait]
impl CheckpointRepository for FileCheckpointStore {
	async fn save_checkpoint(&self, checkpoint: &ProcessingCheckpoint) -> Result<(), StorageError> {
		let path = self.checkpoint_path(checkpoint);
		write_json(path.clone(), checkpoint).await?;

		debug!(
			progress = checkpoint.progress,
			bytes = checkpoint.bytes_processed,
			"Checkpoint written to {:?}",
			path
		);
		Ok(())
	}

	async fn get_last_checkpoint(
		&self,
		file_hash: &str,
	) -> Result<Option<ProcessingCheckpoint>, StorageError> {
		Ok(self
			.load_checkpoints(file_hash)
			.await?
			.into_iter()
			.next()
			.map(|(_, c)| c))
	}

	async fn list_checkpoints(
		&self,
		file_hash: &str,
	) -> Result<Vec<ProcessingCheckpoint>, StorageError> {
		Ok(self
			.load_checkpoints(file_hash)
			.await?
			.into_iter()
			.map(|(_, c)| c)
			.collect())
	}

	async fn prune_old_checkpoints(&self, file_hash: &str, keep: usize) -> Result<(), StorageError> {
		let checkpoints = self.load_checkpoints(file_hash).await?;
		if checkpoints.len() <= keep {
			return Ok(());
		}

		for (path, _) in checkpoints.into_iter().skip(keep) {
			if let Err(e) = tokio::fs::remove_file(&path).await {
				warn!("Failed to remove old checkpoint {:?}: {}", path, e);
			} else {
				debug!("Removed old checkpoint: {:?}", path);
			}
		}

		Ok(())
	}

	async fn delete_checkpoints(&self, file_hash: &str) -> Result<(), StorageError> {
		remove_dir_if_exists(&self.checkpoint_dir(file_hash)).await?;
		info!("Deleted checkpoints for {}", file_hash);
		Ok(())
	}

	async fn save_metadata(&self, metadata: &FileMetadata) -> Result<(), StorageError> {
		write_json(self.metadata_path(&metadata.file_hash), metadata).await
	}

	async fn get_metadata(&self, file_hash: &str) -> Result<Option<FileMetadata>, StorageError> {
		read_json(&self.metadata_path(file_hash)).await
	}

	async fn save_chunk(&self, chunk: &FileChunk) -> Result<(), StorageError> {
		let (data_path, meta_path) = self.chunk_paths(&chunk.file_hash, chunk.chunk_index);
		write_atomic(data_path, chunk.data.clone()).await?;
		write_json(meta_path, chunk).await
	}

	async fn get_chunk(
		&self,
		file_hash: &str,
		chunk_index: u64,
	) -> Result<Option<FileChunk>, StorageError> {
		let (data_path, meta_path) = self.chunk_paths(file_hash, chunk_index);

		let Some(mut chunk) = read_json::<FileChunk>(&meta_path).await? else {
			return Ok(None);
		};
		chunk.data = match tokio::fs::read(&data_path).await {
			Ok(data) => data,
			Err(e) if e.kind() == ErrorKind::NotFound => {
				return Err(StorageError::NotFound(format!(
					"chunk data {:?}",
					data_path
				)));
			}
			Err(e) => return Err(e.into()),
		};

		Ok(Some(chunk))
	}

	async fn get_file_chunks(&self, file_hash: &str) -> Result<Vec<FileChunk>, StorageError> {
		let mut indices: Vec<u64> = list_dir(&self.chunk_dir(file_hash))
			.await?
			.iter()
			.filter_map(|p| p.file_name().and_then(|n| n.to_str()))
			.filter_map(|n| n.strip_suffix(".meta.json"))
			.filter_map(|n| n.parse().ok())
			.collect();
		indices.sort_unstable();

		let mut chunks = Vec::with_capacity(indices.len());
		for index in indices {
			if let Some(chunk) = self.get_chunk(file_hash, index).await? {
				chunks.push(chunk);
			}
		}
		Ok(chunks)
	}

	async fn delete_file_chunks(&self, file_hash: &str) -> Result<(), StorageError> {
		remove_dir_if_exists(&self.chunk_dir(file_hash)).await
	}

	async fn storage_usage(&self) -> StorageUsage {
		let root = self.data_dir.clone();
		let used = tokio::task::spawn_blocking(move || directory_size(&root))
			.await
			.unwrap_or_else(|e| {
				warn!("Failed to measure storage usage: {}", e);
				0
			});

		StorageUsage::new(used, self.quota.unwrap_or(0))
	}

	async fn stats(&self) -> Result<StorageStats, StorageError> {
		let root = self.data_dir.clone();
		let (total_chunks, total_checkpoints, total_files) =
			tokio::task::spawn_blocking(move || {
				(
					count_files(&root.join(CHUNKS_DIR), ".bin"),
					count_files(&root.join(CHECKPOINTS_DIR), ".json"),
					count_files(&root.join(METADATA_DIR), ".json"),
				)
			})
			.await
			.map_err(std::io::Error::other)?;

		Ok(StorageStats {
			total_chunks,
			total_checkpoints,
			total_files,
			storage_usage: self.storage_usage().await,
		})
	}

	async fn clear_all(&self) -> Result<(), StorageError> {
		for dir in [CHECKPOINTS_DIR, METADATA_DIR, CHUNKS_DIR] {
			remove_dir_if_exists(&self.data_dir.join(dir)).await?;
		}
		info!("Cleared all persistent data in {:?}", self.data_dir);
		Ok(())
	}
}

/// File-based implementation of StateSnapshotRepository
#[derive(Debug, Clone)]
pub struct FileStateSnapshotStore {
	path: PathBuf,
}

impl FileStateSnapshotStore {
	pub fn new(data_dir: impl AsRef<Path>) -> Self {
		Self {
			path: data_dir.as_ref().join(SNAPSHOT_FILE),
		}
	}
}

#[async_trait::async_trait]
impl StateSnapshotRepository for FileStateSnapshotStore {
	async fn save(&self, state: &ProcessingState) -> Result<(), StorageError> {
		write_json(self.path.clone(), state).await
	}

	async fn load(&self) -> Result<Option<ProcessingState>, StorageError> {
		Ok(read_json::<ProcessingState>(&self.path)
			.await?
			.map(ProcessingState::normalized))
	}

	async fn clear(&self) -> Result<(), StorageError> {
		match tokio::fs::remove_file(&self.path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scan::types::{CheckpointStatus, ProcessingState};

	fn checkpoint(hash: &str, timestamp: i64, bytes: u64) -> ProcessingCheckpoint {
		ProcessingCheckpoint {
			id: ProcessingCheckpoint::checkpoint_id(hash, timestamp),
			file_hash: hash.to_string(),
			file_name: "ledger.bin".to_string(),
			file_size: 1000,
			last_chunk_index: bytes / 100,
			bytes_processed: bytes,
			progress: bytes as f64 / 10.0,
			timestamp,
			balances: Vec::new(),
			status: CheckpointStatus::Active,
		}
	}

	#[test]
	fn sanitize_replaces_path_separators() {
		assert_eq!(sanitize("fallback-a/b.bin-1-2"), "fallback-a_b.bin-1-2");
		assert_eq!(sanitize("abc-10-0"), "abc-10-0");
	}

	#[tokio::test]
	async fn checkpoints_are_newest_first_and_pruned() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCheckpointStore::new(dir.path());

		for (ts, bytes) in [(1, 100), (2, 200), (3, 300), (4, 400), (5, 500)] {
			store.save_checkpoint(&checkpoint("h", ts, bytes)).await.unwrap();
		}
		store.prune_old_checkpoints("h", 3).await.unwrap();

		let all = store.list_checkpoints("h").await.unwrap();
		let timestamps: Vec<i64> = all.iter().map(|c| c.timestamp).collect();
		assert_eq!(timestamps, vec![5, 4, 3]);
		assert_eq!(
			store.get_last_checkpoint("h").await.unwrap().unwrap().bytes_processed,
			500
		);
		assert!(store.get_last_checkpoint("other").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn chunks_round_trip_and_count_in_stats() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCheckpointStore::new(dir.path()).with_quota(1_000_000);

		for index in [2u64, 0, 1] {
			let chunk = FileChunk {
				file_hash: "h".to_string(),
				chunk_index: index,
				data: vec![index as u8; 16],
				size: 16,
				timestamp: 0,
				processed: true,
			};
			store.save_chunk(&chunk).await.unwrap();
		}
		store.save_checkpoint(&checkpoint("h", 1, 10)).await.unwrap();

		let chunks = store.get_file_chunks("h").await.unwrap();
		assert_eq!(chunks.iter().map(|c| c.chunk_index).collect::<Vec<_>>(), vec![0, 1, 2]);
		assert_eq!(chunks[2].data, vec![2u8; 16]);

		let stats = store.stats().await.unwrap();
		assert_eq!(stats.total_chunks, 3);
		assert_eq!(stats.total_checkpoints, 1);
		assert!(stats.storage_usage.used > 0);
		assert_eq!(stats.storage_usage.available, 1_000_000);

		store.delete_file_chunks("h").await.unwrap();
		assert!(store.get_file_chunks("h").await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn usage_without_quota_reports_zero_available() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCheckpointStore::new(dir.path().join("missing"));
		let usage = store.storage_usage().await;
		assert_eq!(usage, StorageUsage::default());
	}

	#[tokio::test]
	async fn snapshot_slot_saves_loads_and_clears() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileStateSnapshotStore::new(dir.path());
		assert!(store.load().await.unwrap().is_none());

		let mut state = ProcessingState::new("ledger.bin", 100, "h", 0, 1);
		state.set_bytes_processed(30);
		store.save(&state).await.unwrap();

		let loaded = store.load().await.unwrap().unwrap();
		assert_eq!(loaded.bytes_processed(), 30);
		assert_eq!(loaded.progress(), 30.0);

		store.clear().await.unwrap();
		store.clear().await.unwrap();
		assert!(store.load().await.unwrap().is_none());
	}
}

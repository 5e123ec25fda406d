use super::{
	CheckpointRepository, FileChunk, FileMetadata, StateSnapshotRepository, StorageError,
	StorageStats, StorageUsage,
};
use crate::scan::types::{ProcessingCheckpoint, ProcessingState};

use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// In-memory implementation of CheckpointRepository
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
	checkpoints: RwLock<HashMap<String, HashMap<String, ProcessingCheckpoint>>>,
	metadata: RwLock<HashMap<String, FileMetadata>>,
	chunks: RwLock<HashMap<String, BTreeMap<u64, FileChunk>>>,
}

impl MemoryCheckpointStore {
	pub fn new() -> Self {
		Self::default()
	}

	async fn sorted(&self, file_hash: &str) -> Vec<ProcessingCheckpoint> {
		let guard = self.checkpoints.read().await;
		let mut checkpoints: Vec<ProcessingCheckpoint> = guard
			.get(file_hash)
			.map(|m| m.values().cloned().collect())
			.unwrap_or_default();
		checkpoints.sort_by_key(|c| std::cmp::Reverse(c.timestamp));
		checkpoints
	}
}

#[async_trait::async_trait]
impl CheckpointRepository for MemoryCheckpointStore {
	async fn save_checkpoint(&self, checkpoint: &ProcessingCheckpoint) -> Result<(), StorageError> {
		self.checkpoints
			.write()
			.await
			.entry(checkpoint.file_hash.clone())
			.or_default()
			.insert(checkpoint.id.clone(), checkpoint.clone());
		Ok(())
	}

	async fn get_last_checkpoint(
		&self,
		file_hash: &str,
	) -> Result<Option<ProcessingCheckpoint>, StorageError> {
		Ok(self.sorted(file_hash).await.into_iter().next())
	}

	async fn list_checkpoints(
		&self,
		file_hash: &str,
	) -> Result<Vec<ProcessingCheckpoint>, StorageError> {
		Ok(self.sorted(file_hash).await)
	}

	async fn prune_old_checkpoints(&self, file_hash: &str, keep: usize) -> Result<(), StorageError> {
		let stale: Vec<String> = self
			.sorted(file_hash)
			.await
			.into_iter()
			.skip(keep)
			.map(|c| c.id)
			.collect();

		if let Some(map) = self.checkpoints.write().await.get_mut(file_hash) {
			for id in stale {
				map.remove(&id);
			}
		}
		Ok(())
	}

	async fn delete_checkpoints(&self, file_hash: &str) -> Result<(), StorageError> {
		self.checkpoints.write().await.remove(file_hash);
		Ok(())
	}

	async fn save_metadata(&self, metadata: &FileMetadata) -> Result<(), StorageError> {
		self.metadata
			.write()
			.await
			.insert(metadata.file_hash.clone(), metadata.clone());
		Ok(())
	}

	async fn get_metadata(&self, file_hash: &str) -> Result<Option<FileMetadata>, StorageError> {
		Ok(self.metadata.read().await.get(file_hash).cloned())
	}

	async fn save_chunk(&self, chunk: &FileChunk) -> Result<(), StorageError> {
		self.chunks
			.write()
			.await
			.entry(chunk.file_hash.clone())
			.or_default()
			.insert(chunk.chunk_index, chunk.clone());
		Ok(())
	}

	async fn get_chunk(
		&self,
		file_hash: &str,
		chunk_index: u64,
	) -> Result<Option<FileChunk>, StorageError> {
		Ok(self
			.chunks
			.read()
			.await
			.get(file_hash)
			.and_then(|m| m.get(&chunk_index))
			.cloned())
	}

	async fn get_file_chunks(&self, file_hash: &str) -> Result<Vec<FileChunk>, StorageError> {
		Ok(self
			.chunks
			.read()
			.await
			.get(file_hash)
			.map(|m| m.values().cloned().collect())
			.unwrap_or_default())
	}

	async fn delete_file_chunks(&self, file_hash: &str) -> Result<(), StorageError> {
		self.chunks.write().await.remove(file_hash);
		Ok(())
	}

	async fn storage_usage(&self) -> StorageUsage {
		let used: u64 = self
			.chunks
			.read()
			.await
			.values()
			.flat_map(|m| m.values())
			.map(|c| c.data.len() as u64)
			.sum();
		StorageUsage::new(used, 0)
	}

	async fn stats(&self) -> Result<StorageStats, StorageError> {
		let total_chunks = self.chunks.read().await.values().map(|m| m.len() as u64).sum();
		let total_checkpoints = self
			.checkpoints
			.read()
			.await
			.values()
			.map(|m| m.len() as u64)
			.sum();
		let total_files = self.metadata.read().await.len() as u64;

		Ok(StorageStats {
			total_chunks,
			total_checkpoints,
			total_files,
			storage_usage: self.storage_usage().await,
		})
	}

	async fn clear_all(&self) -> Result<(), StorageError> {
		self.checkpoints.write().await.clear();
		self.metadata.write().await.clear();
		self.chunks.write().await.clear();
		Ok(())
	}
}

/// In-memory implementation of StateSnapshotRepository
#[derive(Debug, Default)]
pub struct MemoryStateSnapshotStore {
	slot: RwLock<Option<ProcessingState>>,
}

impl MemoryStateSnapshotStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl StateSnapshotRepository for MemoryStateSnapshotStore {
	async fn save(&self, state: &ProcessingState) -> Result<(), StorageError> {
		*self.slot.write().await = Some(state.clone());
		Ok(())
	}

	async fn load(&self) -> Result<Option<ProcessingState>, StorageError> {
		Ok(self.slot.read().await.clone())
	}

	async fn clear(&self) -> Result<(), StorageError> {
		*self.slot.write().await = None;
		Ok(())
	}
}

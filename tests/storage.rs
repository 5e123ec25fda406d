use scan_state_sync::scan::{ProcessingCheckpoint, ProcessingState, ProcessingStatus};
use scan_state_sync::storage::{
	CheckpointRepository, FileCheckpointStore, FileMetadata, FileStateSnapshotStore,
	StateSnapshotRepository,
};
use chrono::Utc;
use tempfile::TempDir;

fn checkpoint_at(bytes: u64, timestamp: i64) -> ProcessingCheckpoint {
	let mut state = ProcessingState::new("ledger.bin", 1_000, "abc-1000-0", 0, 10);
	state.set_bytes_processed(bytes);
	ProcessingCheckpoint::from_state(&state, timestamp).unwrap()
}

#[tokio::test]
async fn checkpoints_survive_a_new_store_instance() {
	let dir = TempDir::new().unwrap();
	{
		let store = FileCheckpointStore::new(dir.path());
		store.save_checkpoint(&checkpoint_at(100, 1)).await.unwrap();
		store.save_checkpoint(&checkpoint_at(400, 2)).await.unwrap();
	}

	let reopened = FileCheckpointStore::new(dir.path());
	let last = reopened.get_last_checkpoint("abc-1000-0").await.unwrap().unwrap();
	assert_eq!(last.bytes_processed, 400);
	assert_eq!(last.progress, 40.0);
	assert!(last.is_valid());
}

#[tokio::test]
async fn corrupt_checkpoint_file_is_skipped() {
	let dir = TempDir::new().unwrap();
	let store = FileCheckpointStore::new(dir.path());
	store.save_checkpoint(&checkpoint_at(300, 5)).await.unwrap();

	let junk = dir.path().join("checkpoints").join("abc-1000-0").join("broken.json");
	tokio::fs::write(&junk, b"{ not json").await.unwrap();

	let all = store.list_checkpoints("abc-1000-0").await.unwrap();
	assert_eq!(all.len(), 1);
	assert_eq!(all[0].bytes_processed, 300);
}

#[tokio::test]
async fn pruning_keeps_newest_across_reopen() {
	let dir = TempDir::new().unwrap();
	let store = FileCheckpointStore::new(dir.path());
	for (i, bytes) in [100, 200, 300, 400, 500].into_iter().enumerate() {
		store.save_checkpoint(&checkpoint_at(bytes, i as i64 + 1)).await.unwrap();
	}
	store.prune_old_checkpoints("abc-1000-0", 3).await.unwrap();

	let reopened = FileCheckpointStore::new(dir.path());
	let kept: Vec<u64> = reopened
		.list_checkpoints("abc-1000-0")
		.await
		.unwrap()
		.iter()
		.map(|c| c.bytes_processed)
		.collect();
	assert_eq!(kept, vec![500, 400, 300]);
}

#[tokio::test]
async fn stats_count_files_and_report_quota_usage() {
	let dir = TempDir::new().unwrap();
	let store = FileCheckpointStore::new(dir.path()).with_quota(1_000_000_000);
	store.save_checkpoint(&checkpoint_at(100, 1)).await.unwrap();
	store
		.save_metadata(&FileMetadata {
			file_hash: "abc-1000-0".to_string(),
			file_name: "ledger.bin".to_string(),
			file_size: 1_000,
			total_chunks: 10,
			chunks_stored: 0,
			created_at: Utc::now(),
			last_accessed: Utc::now(),
		})
		.await
		.unwrap();

	let stats = store.stats().await.unwrap();
	assert_eq!(stats.total_checkpoints, 1);
	assert_eq!(stats.total_files, 1);
	assert!(stats.storage_usage.used > 0);
	assert_eq!(stats.storage_usage.available, 1_000_000_000);

	store.clear_all().await.unwrap();
	let stats = store.stats().await.unwrap();
	assert_eq!(stats.total_checkpoints, 0);
	assert_eq!(stats.total_files, 0);
}

#[tokio::test]
async fn snapshot_load_rebuilds_progress_from_bytes() {
	let dir = TempDir::new().unwrap();
	let mut state = ProcessingState::new("ledger.bin", 1_000, "abc-1000-0", 0, 10);
	state.set_bytes_processed(250);
	state.status = ProcessingStatus::Paused;

	// Tamper with the derived field on disk.
	let mut raw = serde_json::to_value(&state).unwrap();
	raw["progress"] = serde_json::json!(99.0);
	tokio::fs::write(
		dir.path().join("processing_state.json"),
		serde_json::to_vec(&raw).unwrap(),
	)
	.await
	.unwrap();

	let loaded = FileStateSnapshotStore::new(dir.path()).load().await.unwrap().unwrap();
	assert_eq!(loaded.bytes_processed(), 250);
	assert_eq!(loaded.progress(), 25.0);
	assert_eq!(loaded.status, ProcessingStatus::Paused);
}

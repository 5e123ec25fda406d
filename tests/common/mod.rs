#![allow(dead_code)]

use scan_state_sync::remote::{RemoteError, RemoteSnapshot, RemoteStore};
use scan_state_sync::scan::engine::{
	CheckpointConfig, RemoteSyncConfig, ScanConfig, ScanOrchestrator, ScanServices,
};
use scan_state_sync::scan::{CurrencyBalance, MemorySource, ProcessingState, ScanError, ScanSource};
use scan_state_sync::storage::{
	FileCheckpointStore, FileStateSnapshotStore, StateSnapshotRepository, StorageError,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const CHUNK: u64 = 64 * 1024;

/// Offset of the record inside each chunk. Keeps records away from chunk
/// boundaries so every record is seen by exactly one chunk.
pub const RECORD_OFFSET: usize = 100;

/// `chunks` chunks of zeros with one `code` record of `raw / 100` per chunk.
pub fn ledger_data(chunks: usize, code: &[u8; 3], raw: u32) -> Vec<u8> {
	let mut data = vec![0u8; chunks * CHUNK as usize];
	for chunk in 0..chunks {
		let at = chunk * CHUNK as usize + RECORD_OFFSET;
		data[at..at + 3].copy_from_slice(code);
		data[at + 3..at + 7].copy_from_slice(&raw.to_le_bytes());
	}
	data
}

pub fn balance<'a>(state: &'a ProcessingState, code: &str) -> &'a CurrencyBalance {
	state
		.balances
		.iter()
		.find(|b| b.currency == code)
		.unwrap_or_else(|| panic!("no {code} balance in {:?}", state.balances))
}

pub fn fast_configs() -> (ScanConfig, CheckpointConfig, RemoteSyncConfig) {
	(
		ScanConfig {
			chunk_size: CHUNK,
			yield_sleep: Duration::ZERO,
			..ScanConfig::default()
		},
		CheckpointConfig {
			min_interval: Duration::ZERO,
			..CheckpointConfig::default()
		},
		RemoteSyncConfig {
			save_interval: Duration::from_millis(20),
			max_retries: 3,
			base_delay: Duration::from_millis(1),
		},
	)
}

/// Orchestrator over file stores in `dir` with fast test timings.
pub fn orchestrator(dir: &Path, remote: Arc<dyn RemoteStore>) -> Arc<ScanOrchestrator> {
	let (_, checkpoints, _) = fast_configs();
	orchestrator_with(
		dir,
		Arc::new(FileStateSnapshotStore::new(dir)),
		remote,
		checkpoints,
	)
}

/// Orchestrator over a file checkpoint store in `dir` with the given snapshot
/// store and checkpoint timings.
pub fn orchestrator_with(
	dir: &Path,
	snapshots: Arc<dyn StateSnapshotRepository>,
	remote: Arc<dyn RemoteStore>,
	checkpoints: CheckpointConfig,
) -> Arc<ScanOrchestrator> {
	let (scan, _, sync) = fast_configs();
	ScanOrchestrator::new(
		ScanServices {
			checkpoints: Arc::new(FileCheckpointStore::new(dir)),
			snapshots,
			remote,
		},
		scan,
		checkpoints,
		sync,
	)
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
	for _ in 0..1000 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("condition not reached in time");
}

/// Source that lets one read through per permit on `gate`.
pub struct GatedSource {
	inner: MemorySource,
	pub gate: Arc<Semaphore>,
}

impl GatedSource {
	pub fn new(inner: MemorySource, permits: usize) -> Self {
		Self {
			inner,
			gate: Arc::new(Semaphore::new(permits)),
		}
	}
}

#[async_trait::async_trait]
impl ScanSource for GatedSource {
	fn name(&self) -> &str {
		self.inner.name()
	}

	fn size(&self) -> u64 {
		self.inner.size()
	}

	fn last_modified_ms(&self) -> i64 {
		self.inner.last_modified_ms()
	}

	async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>, ScanError> {
		// Hashing reads happen before the first chunk and bypass the gate.
		if len != CHUNK as usize {
			return self.inner.read_range(offset, len).await;
		}
		self.gate
			.acquire()
			.await
			.map_err(|e| ScanError::ChunkRead {
				offset,
				reason: e.to_string(),
			})?
			.forget();
		self.inner.read_range(offset, len).await
	}
}

/// Snapshot store over `dir` where every save takes one permit from `gate`.
pub struct GatedSnapshotStore {
	inner: FileStateSnapshotStore,
	pub gate: Arc<Semaphore>,
}

impl GatedSnapshotStore {
	pub fn new(dir: &Path, permits: usize) -> Self {
		Self {
			inner: FileStateSnapshotStore::new(dir),
			gate: Arc::new(Semaphore::new(permits)),
		}
	}
}

#[async_trait::async_trait]
impl StateSnapshotRepository for GatedSnapshotStore {
	async fn save(&self, state: &ProcessingState) -> Result<(), StorageError> {
		self.gate
			.acquire()
			.await
			.map_err(|e| StorageError::Io(std::io::Error::other(e)))?
			.forget();
		self.inner.save(state).await
	}

	async fn load(&self) -> Result<Option<ProcessingState>, StorageError> {
		self.inner.load().await
	}

	async fn clear(&self) -> Result<(), StorageError> {
		self.inner.clear().await
	}
}

/// Source whose chunk reads fail at the given offsets.
pub struct FlakySource {
	inner: MemorySource,
	failing: HashSet<u64>,
}

impl FlakySource {
	pub fn new(inner: MemorySource, failing: impl IntoIterator<Item = u64>) -> Self {
		Self {
			inner,
			failing: failing.into_iter().collect(),
		}
	}
}

#[async_trait::async_trait]
impl ScanSource for FlakySource {
	fn name(&self) -> &str {
		self.inner.name()
	}

	fn size(&self) -> u64 {
		self.inner.size()
	}

	fn last_modified_ms(&self) -> i64 {
		self.inner.last_modified_ms()
	}

	async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>, ScanError> {
		if len == CHUNK as usize && self.failing.contains(&offset) {
			return Err(ScanError::ChunkRead {
				offset,
				reason: "injected read fault".to_string(),
			});
		}
		self.inner.read_range(offset, len).await
	}
}

/// Remote that is configured but never reachable.
#[derive(Default)]
pub struct UnreachableRemote {
	pub attempts: AtomicUsize,
}

impl UnreachableRemote {
	fn fail<T>(&self) -> Result<T, RemoteError> {
		self.attempts.fetch_add(1, Ordering::SeqCst);
		Err(RemoteError::Status {
			status: 503,
			body: "service unavailable".to_string(),
		})
	}
}

#[async_trait::async_trait]
impl RemoteStore for UnreachableRemote {
	fn is_configured(&self) -> bool {
		true
	}

	async fn insert_state(&self, _state: &ProcessingState) -> Result<String, RemoteError> {
		self.fail()
	}

	async fn update_state(&self, _id: &str, _state: &ProcessingState) -> Result<(), RemoteError> {
		self.fail()
	}

	async fn find_active_by_hash(
		&self,
		_file_hash: &str,
	) -> Result<Option<RemoteSnapshot>, RemoteError> {
		self.fail()
	}

	async fn find_latest_active(&self) -> Result<Option<RemoteSnapshot>, RemoteError> {
		self.fail()
	}

	async fn delete_state(&self, _id: &str) -> Result<(), RemoteError> {
		self.fail()
	}

	async fn upsert_balances(&self, _state: &ProcessingState) -> Result<(), RemoteError> {
		self.fail()
	}

	async fn load_balances(&self, _file_hash: &str) -> Result<Vec<CurrencyBalance>, RemoteError> {
		self.fail()
	}

	async fn delete_balances(&self, _file_hash: &str) -> Result<(), RemoteError> {
		self.fail()
	}
}

#[derive(Default)]
pub struct RecordingInner {
	pub rows: Vec<(String, ProcessingState)>,
	pub inserts: usize,
	pub updates: Vec<String>,
	pub balances: Vec<(String, Vec<CurrencyBalance>)>,
	pub deleted: Vec<String>,
}

/// In-memory remote that records every call.
#[derive(Default)]
pub struct RecordingRemote {
	pub inner: Mutex<RecordingInner>,
}

impl RecordingRemote {
	/// Seed an existing row, as left behind by an earlier session.
	pub fn with_row(id: &str, state: ProcessingState) -> Self {
		let remote = Self::default();
		remote
			.inner
			.lock()
			.unwrap()
			.rows
			.push((id.to_string(), state));
		remote
	}

	pub fn inserts(&self) -> usize {
		self.inner.lock().unwrap().inserts
	}

	pub fn updates(&self) -> Vec<String> {
		self.inner.lock().unwrap().updates.clone()
	}

	pub fn row(&self, id: &str) -> Option<ProcessingState> {
		let inner = self.inner.lock().unwrap();
		inner.rows.iter().find(|(row, _)| row == id).map(|(_, s)| s.clone())
	}

	pub fn row_ids(&self) -> Vec<String> {
		let inner = self.inner.lock().unwrap();
		inner.rows.iter().map(|(id, _)| id.clone()).collect()
	}
}

#[async_trait::async_trait]
impl RemoteStore for RecordingRemote {
	fn is_configured(&self) -> bool {
		true
	}

	async fn insert_state(&self, state: &ProcessingState) -> Result<String, RemoteError> {
		let mut inner = self.inner.lock().unwrap();
		inner.inserts += 1;
		let id = format!("row-{}", inner.inserts);
		inner.rows.push((id.clone(), state.clone()));
		Ok(id)
	}

	async fn update_state(&self, id: &str, state: &ProcessingState) -> Result<(), RemoteError> {
		let mut inner = self.inner.lock().unwrap();
		inner.updates.push(id.to_string());
		match inner.rows.iter_mut().find(|(row, _)| row == id) {
			Some((_, row)) => {
				*row = state.clone();
				Ok(())
			}
			None => Err(RemoteError::Status {
				status: 404,
				body: format!("no row {id}"),
			}),
		}
	}

	async fn find_active_by_hash(
		&self,
		file_hash: &str,
	) -> Result<Option<RemoteSnapshot>, RemoteError> {
		let inner = self.inner.lock().unwrap();
		Ok(inner
			.rows
			.iter()
			.rev()
			.find(|(_, s)| s.file_hash == file_hash && s.status.is_active())
			.map(|(id, s)| RemoteSnapshot {
				record_id: id.clone(),
				state: s.clone(),
			}))
	}

	async fn find_latest_active(&self) -> Result<Option<RemoteSnapshot>, RemoteError> {
		let inner = self.inner.lock().unwrap();
		Ok(inner
			.rows
			.iter()
			.filter(|(_, s)| s.status.is_active())
			.max_by_key(|(_, s)| s.last_update_time)
			.map(|(id, s)| RemoteSnapshot {
				record_id: id.clone(),
				state: s.clone(),
			}))
	}

	async fn delete_state(&self, id: &str) -> Result<(), RemoteError> {
		let mut inner = self.inner.lock().unwrap();
		inner.rows.retain(|(row, _)| row != id);
		inner.deleted.push(id.to_string());
		Ok(())
	}

	async fn upsert_balances(&self, state: &ProcessingState) -> Result<(), RemoteError> {
		let mut inner = self.inner.lock().unwrap();
		inner.balances.retain(|(hash, _)| *hash != state.file_hash);
		inner
			.balances
			.push((state.file_hash.clone(), state.balances.clone()));
		Ok(())
	}

	async fn load_balances(&self, file_hash: &str) -> Result<Vec<CurrencyBalance>, RemoteError> {
		let inner = self.inner.lock().unwrap();
		Ok(inner
			.balances
			.iter()
			.find(|(hash, _)| hash == file_hash)
			.map(|(_, b)| b.clone())
			.unwrap_or_default())
	}

	async fn delete_balances(&self, file_hash: &str) -> Result<(), RemoteError> {
		self.inner
			.lock()
			.unwrap()
			.balances
			.retain(|(hash, _)| hash != file_hash);
		Ok(())
	}
}

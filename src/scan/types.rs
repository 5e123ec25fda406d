use crate::remote::RemoteError;
use crate::scan::currency::account_name_for;
use crate::storage::StorageError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
	#[default]
	Idle,
	Processing,
	Paused,
	Completed,
	Error,
}

impl ProcessingStatus {
	/// A run that still owns its file hash: processing or paused.
	pub fn is_active(&self) -> bool {
		matches!(self, ProcessingStatus::Processing | ProcessingStatus::Paused)
	}

	/// Completed and error are final for the run that reached them.
	pub fn is_terminal(&self) -> bool {
		matches!(self, ProcessingStatus::Completed | ProcessingStatus::Error)
	}
}

/// Mirror status of the state in the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
	Synced,
	#[default]
	Syncing,
	Error,
	LocalOnly,
}

/// Status recorded on a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
	Active,
	Paused,
	Completed,
	Error,
}

impl From<ProcessingStatus> for CheckpointStatus {
	fn from(status: ProcessingStatus) -> Self {
		match status {
			ProcessingStatus::Processing => CheckpointStatus::Active,
			ProcessingStatus::Paused => CheckpointStatus::Paused,
			ProcessingStatus::Completed => CheckpointStatus::Completed,
			ProcessingStatus::Idle | ProcessingStatus::Error => CheckpointStatus::Error,
		}
	}
}

/// Upper bound on `CurrencyBalance::amounts`. Balances are cloned into every
/// snapshot, notification and checkpoint, so the sample list stays bounded.
pub const MAX_AMOUNT_SAMPLES: usize = 1_000;

/// Running statistics for one currency code found in the scanned file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyBalance {
	pub currency: String,
	pub account_name: String,
	pub total_amount: f64,
	pub transaction_count: u64,
	pub average_transaction: f64,
	pub largest_transaction: f64,
	pub smallest_transaction: f64,
	/// The first `MAX_AMOUNT_SAMPLES` matched amounts, in scan order. The
	/// statistics cover every match.
	pub amounts: Vec<f64>,
	pub last_updated: DateTime<Utc>,
}

impl CurrencyBalance {
	/// Zeroed balance for a currency seen for the first time.
	pub fn new(currency: &str) -> Self {
		Self {
			currency: currency.to_string(),
			account_name: account_name_for(currency),
			total_amount: 0.0,
			transaction_count: 0,
			average_transaction: 0.0,
			largest_transaction: 0.0,
			smallest_transaction: f64::INFINITY,
			amounts: Vec::new(),
			last_updated: Utc::now(),
		}
	}

	/// Fold one observed amount into the statistics.
	pub fn record(&mut self, amount: f64) {
		self.total_amount += amount;
		self.transaction_count += 1;
		if self.amounts.len() < MAX_AMOUNT_SAMPLES {
			self.amounts.push(amount);
		}
		self.average_transaction = self.total_amount / self.transaction_count as f64;
		self.largest_transaction = self.largest_transaction.max(amount);
		self.smallest_transaction = self.smallest_transaction.min(amount);
		self.last_updated = Utc::now();
	}
}

/// Compute progress in percent from a byte position.
pub fn progress_for(bytes_processed: u64, file_size: u64) -> f64 {
	if file_size == 0 {
		return 0.0;
	}
	bytes_processed as f64 / file_size as f64 * 100.0
}

/// The authoritative record of one scan.
///
/// `bytes_processed` and `progress` are private so that progress is always
/// derived from the byte position; use [`ProcessingState::set_bytes_processed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingState {
	pub id: String,
	pub file_name: String,
	pub file_size: u64,
	bytes_processed: u64,
	progress: f64,
	pub status: ProcessingStatus,
	pub start_time: DateTime<Utc>,
	pub last_update_time: DateTime<Utc>,
	pub balances: Vec<CurrencyBalance>,
	pub chunk_index: u64,
	pub total_chunks: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_message: Option<String>,
	pub file_hash: String,
	pub file_last_modified: i64,
	pub sync_status: SyncStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_sync_time: Option<DateTime<Utc>>,
	#[serde(default)]
	pub retry_count: u32,
}

impl ProcessingState {
	/// Create a fresh `processing` state at byte zero.
	pub fn new(
		file_name: &str,
		file_size: u64,
		file_hash: &str,
		file_last_modified: i64,
		total_chunks: u64,
	) -> Self {
		let now = Utc::now();
		Self {
			id: format!("process_{}", now.timestamp_millis()),
			file_name: file_name.to_string(),
			file_size,
			bytes_processed: 0,
			progress: 0.0,
			status: ProcessingStatus::Processing,
			start_time: now,
			last_update_time: now,
			balances: Vec::new(),
			chunk_index: 0,
			total_chunks,
			error_message: None,
			file_hash: file_hash.to_string(),
			file_last_modified,
			sync_status: SyncStatus::Syncing,
			last_sync_time: None,
			retry_count: 0,
		}
	}

	pub fn bytes_processed(&self) -> u64 {
		self.bytes_processed
	}

	pub fn progress(&self) -> f64 {
		self.progress
	}

	/// Move the byte cursor, clamped to the file size, and recompute progress.
	pub fn set_bytes_processed(&mut self, bytes_processed: u64) {
		self.bytes_processed = bytes_processed.min(self.file_size);
		self.progress = progress_for(self.bytes_processed, self.file_size);
	}

	/// Stamp `last_update_time` with the current time.
	pub fn touch(&mut self) {
		self.last_update_time = Utc::now();
	}

	/// Rebuild derived fields after deserializing data from an outside source.
	pub fn normalized(mut self) -> Self {
		let bytes = self.bytes_processed;
		self.set_bytes_processed(bytes);
		self
	}
}

/// Durable snapshot written to the local store for crash and restart recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingCheckpoint {
	pub id: String,
	pub file_hash: String,
	pub file_name: String,
	pub file_size: u64,
	pub last_chunk_index: u64,
	pub bytes_processed: u64,
	pub progress: f64,
	/// Unix milliseconds.
	pub timestamp: i64,
	pub balances: Vec<CurrencyBalance>,
	pub status: CheckpointStatus,
}

impl ProcessingCheckpoint {
	pub fn checkpoint_id(file_hash: &str, timestamp: i64) -> String {
		format!("checkpoint_{}_{}", file_hash, timestamp)
	}

	/// Snapshot a state. Returns `None` if the state carries no file hash or
	/// any numeric field is not finite.
	pub fn from_state(state: &ProcessingState, timestamp: i64) -> Option<Self> {
		if state.file_hash.is_empty() {
			return None;
		}

		let checkpoint = Self {
			id: Self::checkpoint_id(&state.file_hash, timestamp),
			file_hash: state.file_hash.clone(),
			file_name: if state.file_name.is_empty() {
				"Unknown".to_string()
			} else {
				state.file_name.clone()
			},
			file_size: state.file_size,
			last_chunk_index: state.chunk_index,
			bytes_processed: state.bytes_processed(),
			progress: state.progress(),
			timestamp,
			balances: state.balances.clone(),
			status: state.status.into(),
		};

		checkpoint.is_valid().then_some(checkpoint)
	}

	/// Numeric sanity check applied before every write.
	pub fn is_valid(&self) -> bool {
		self.progress.is_finite()
			&& (0.0..=100.0).contains(&self.progress)
			&& self.bytes_processed <= self.file_size
			&& self.balances.iter().all(|b| {
				b.total_amount.is_finite()
					&& b.average_transaction.is_finite()
					&& b.largest_transaction.is_finite()
					&& b.smallest_transaction.is_finite()
			})
	}
}

/// Error types for the scan pipeline
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),

	#[error("Remote error: {0}")]
	Remote(#[from] RemoteError),

	#[error("Invalid file size: {0}")]
	InvalidFileSize(u64),

	#[error("Failed to read chunk at offset {offset}: {reason}")]
	ChunkRead { offset: u64, reason: String },

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("A scan is already active")]
	AlreadyActive,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn progress_is_recomputed_from_bytes() {
		let mut state = ProcessingState::new("ledger.bin", 200, "abc-200-0", 0, 1);
		state.set_bytes_processed(50);
		assert_eq!(state.bytes_processed(), 50);
		assert!((state.progress() - 25.0).abs() < f64::EPSILON);

		state.set_bytes_processed(500);
		assert_eq!(state.bytes_processed(), 200);
		assert!((state.progress() - 100.0).abs() < f64::EPSILON);
	}

	#[test]
	fn zero_sized_file_has_zero_progress() {
		let mut state = ProcessingState::new("empty.bin", 0, "h", 0, 0);
		state.set_bytes_processed(10);
		assert_eq!(state.bytes_processed(), 0);
		assert_eq!(state.progress(), 0.0);
	}

	#[test]
	fn balance_statistics_hold_after_records() {
		let mut balance = CurrencyBalance::new("USD");
		balance.record(10.0);
		balance.record(30.0);
		balance.record(20.0);

		assert_eq!(balance.transaction_count, 3);
		assert_eq!(balance.total_amount, 60.0);
		assert_eq!(balance.average_transaction, 20.0);
		assert_eq!(balance.largest_transaction, 30.0);
		assert_eq!(balance.smallest_transaction, 10.0);
		assert_eq!(balance.amounts, vec![10.0, 30.0, 20.0]);
		assert_eq!(balance.account_name, "US Dollars Account");
	}

	#[test]
	fn amount_samples_are_capped_but_statistics_are_not() {
		let mut balance = CurrencyBalance::new("EUR");
		for i in 0..(MAX_AMOUNT_SAMPLES + 250) {
			balance.record((i + 1) as f64);
		}

		assert_eq!(balance.amounts.len(), MAX_AMOUNT_SAMPLES);
		assert_eq!(balance.amounts[0], 1.0);
		assert_eq!(balance.transaction_count, (MAX_AMOUNT_SAMPLES + 250) as u64);
		assert_eq!(balance.largest_transaction, (MAX_AMOUNT_SAMPLES + 250) as f64);
	}

	#[test]
	fn checkpoint_from_state_maps_status_and_id() {
		let mut state = ProcessingState::new("ledger.bin", 100, "hash-100-7", 7, 1);
		state.set_bytes_processed(40);
		state.status = ProcessingStatus::Paused;

		let checkpoint = ProcessingCheckpoint::from_state(&state, 1_700_000_000_000).unwrap();
		assert_eq!(checkpoint.id, "checkpoint_hash-100-7_1700000000000");
		assert_eq!(checkpoint.status, CheckpointStatus::Paused);
		assert_eq!(checkpoint.bytes_processed, 40);
		assert_eq!(checkpoint.progress, 40.0);
	}

	#[test]
	fn checkpoint_rejects_state_without_hash_or_with_bad_numbers() {
		let state = ProcessingState::new("ledger.bin", 100, "", 0, 1);
		assert!(ProcessingCheckpoint::from_state(&state, 1).is_none());

		let mut state = ProcessingState::new("ledger.bin", 100, "h", 0, 1);
		let mut balance = CurrencyBalance::new("EUR");
		balance.total_amount = f64::NAN;
		state.balances.push(balance);
		assert!(ProcessingCheckpoint::from_state(&state, 1).is_none());
	}

	#[test]
	fn sync_status_serializes_as_kebab_case() {
		let json = serde_json::to_string(&SyncStatus::LocalOnly).unwrap();
		assert_eq!(json, "\"local-only\"");
		let json = serde_json::to_string(&ProcessingStatus::Paused).unwrap();
		assert_eq!(json, "\"paused\"");
	}
}

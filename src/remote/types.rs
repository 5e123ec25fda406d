use crate::scan::types::{CurrencyBalance, ProcessingState, ProcessingStatus, SyncStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row of the `processing_state` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStateRecord {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub user_id: String,
	pub file_name: String,
	pub file_size: u64,
	pub bytes_processed: u64,
	pub progress: f64,
	pub status: ProcessingStatus,
	pub start_time: DateTime<Utc>,
	pub last_update_time: DateTime<Utc>,
	#[serde(default)]
	pub balances: Vec<CurrencyBalance>,
	pub chunk_index: u64,
	pub total_chunks: u64,
	#[serde(default)]
	pub error_message: Option<String>,
	pub file_hash: String,
	pub file_last_modified: i64,
	#[serde(default)]
	pub sync_status: Option<SyncStatus>,
	#[serde(default)]
	pub last_sync_time: Option<DateTime<Utc>>,
	#[serde(default)]
	pub retry_count: Option<u32>,
}

impl RemoteStateRecord {
	/// Row written for `state`. A row reaching the store is by definition
	/// synced, so the sync fields are stamped here rather than copied.
	pub fn from_state(user_id: &str, state: &ProcessingState) -> Self {
		Self {
			id: None,
			user_id: user_id.to_string(),
			file_name: state.file_name.clone(),
			file_size: state.file_size,
			bytes_processed: state.bytes_processed(),
			progress: state.progress(),
			status: state.status,
			start_time: state.start_time,
			last_update_time: state.last_update_time,
			balances: state.balances.clone(),
			chunk_index: state.chunk_index,
			total_chunks: state.total_chunks,
			error_message: state.error_message.clone(),
			file_hash: state.file_hash.clone(),
			file_last_modified: state.file_last_modified,
			sync_status: Some(SyncStatus::Synced),
			last_sync_time: Some(Utc::now()),
			retry_count: Some(0),
		}
	}

	/// Rebuild a state from a stored row. Progress is recomputed from the byte
	/// position; the stored value is informational only.
	pub fn into_state(self) -> ProcessingState {
		let mut state = ProcessingState::new(
			&self.file_name,
			self.file_size,
			&self.file_hash,
			self.file_last_modified,
			self.total_chunks,
		);
		if let Some(id) = self.id {
			state.id = id;
		}
		state.set_bytes_processed(self.bytes_processed);
		state.status = self.status;
		state.start_time = self.start_time;
		state.last_update_time = self.last_update_time;
		state.balances = self.balances;
		state.chunk_index = self.chunk_index;
		state.error_message = self.error_message;
		state.sync_status = self.sync_status.unwrap_or(SyncStatus::Synced);
		state.last_sync_time = self.last_sync_time;
		state.retry_count = self.retry_count.unwrap_or(0);
		state
	}
}

/// Row of the `currency_balances` table, unique on `(user_id, file_hash, currency)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBalanceRecord {
	pub user_id: String,
	pub file_hash: String,
	pub file_name: String,
	pub file_size: u64,
	pub currency: String,
	pub account_name: String,
	pub total_amount: f64,
	pub transaction_count: u64,
	pub average_transaction: f64,
	pub largest_transaction: f64,
	pub smallest_transaction: f64,
	#[serde(default)]
	pub amounts: Vec<f64>,
	pub last_updated: DateTime<Utc>,
	pub status: ProcessingStatus,
	pub progress: f64,
}

impl RemoteBalanceRecord {
	pub fn from_balance(user_id: &str, state: &ProcessingState, balance: &CurrencyBalance) -> Self {
		Self {
			user_id: user_id.to_string(),
			file_hash: state.file_hash.clone(),
			file_name: state.file_name.clone(),
			file_size: state.file_size,
			currency: balance.currency.clone(),
			account_name: balance.account_name.clone(),
			total_amount: balance.total_amount,
			transaction_count: balance.transaction_count,
			average_transaction: balance.average_transaction,
			largest_transaction: balance.largest_transaction,
			smallest_transaction: balance.smallest_transaction,
			amounts: balance.amounts.clone(),
			last_updated: Utc::now(),
			status: state.status,
			progress: state.progress(),
		}
	}

	pub fn into_balance(self) -> CurrencyBalance {
		CurrencyBalance {
			currency: self.currency,
			account_name: self.account_name,
			total_amount: self.total_amount,
			transaction_count: self.transaction_count,
			average_transaction: self.average_transaction,
			largest_transaction: self.largest_transaction,
			smallest_transaction: self.smallest_transaction,
			amounts: self.amounts,
			last_updated: self.last_updated,
		}
	}
}

/// An in-flight state found in the remote store, with the row id used for
/// later updates.
#[derive(Debug, Clone)]
pub struct RemoteSnapshot {
	pub record_id: String,
	pub state: ProcessingState,
}

/// Error types for the remote store
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("Remote returned {status}: {body}")]
	Status { status: u16, body: String },

	#[error("JSON parse error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Remote store is not configured")]
	NotConfigured,

	#[error("No user for remote store")]
	NoUser,

	#[error("Remote did not return a record id")]
	MissingId,
}

impl RemoteError {
	/// Whether a retry could succeed. Configuration problems never do.
	pub fn is_retryable(&self) -> bool {
		!matches!(self, RemoteError::NotConfigured | RemoteError::NoUser)
	}
}

//! Remote mirror of the processing state.
//!
//! The scan engine reaches the remote store only through the `RemoteStore`
//! trait. `RestRemoteStore` talks to a PostgREST style endpoint with two tables,
//! `processing_state` and `currency_balances`. `LocalOnlyRemote` stands in when
//! no endpoint is configured and makes every run local-only.

use crate::scan::types::{CurrencyBalance, ProcessingState};

/// HTTP client for the remote tables
pub mod client;
/// Wire records and errors
pub mod types;

pub use client::{RestRemoteConfig, RestRemoteStore};
pub use types::{RemoteBalanceRecord, RemoteError, RemoteSnapshot, RemoteStateRecord};

/// Narrow save/load contract with the remote store.
///
/// All lookups are scoped to the store's configured user.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
	/// `false` when calls would fail with `NotConfigured` or `NoUser`.
	fn is_configured(&self) -> bool;

	/// Insert a new row for `state` and return its id.
	async fn insert_state(&self, state: &ProcessingState) -> Result<String, RemoteError>;

	async fn update_state(&self, record_id: &str, state: &ProcessingState) -> Result<(), RemoteError>;

	/// Newest processing or paused row for a file.
	async fn find_active_by_hash(&self, file_hash: &str)
	-> Result<Option<RemoteSnapshot>, RemoteError>;

	/// Newest processing or paused row of any file.
	async fn find_latest_active(&self) -> Result<Option<RemoteSnapshot>, RemoteError>;

	async fn delete_state(&self, record_id: &str) -> Result<(), RemoteError>;

	/// Upsert one row per currency of `state`.
	async fn upsert_balances(&self, state: &ProcessingState) -> Result<(), RemoteError>;

	async fn load_balances(&self, file_hash: &str) -> Result<Vec<CurrencyBalance>, RemoteError>;

	async fn delete_balances(&self, file_hash: &str) -> Result<(), RemoteError>;
}

/// Remote store used when no endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOnlyRemote;

#[async_trait::async_trait]
impl RemoteStore for LocalOnlyRemote {
	fn is_configured(&self) -> bool {
		false
	}

	async fn insert_state(&self, _state: &ProcessingState) -> Result<String, RemoteError> {
		Err(RemoteError::NotConfigured)
	}

	async fn update_state(&self, _record_id: &str, _state: &ProcessingState) -> Result<(), RemoteError> {
		Err(RemoteError::NotConfigured)
	}

	async fn find_active_by_hash(
		&self,
		_file_hash: &str,
	) -> Result<Option<RemoteSnapshot>, RemoteError> {
		Ok(None)
	}

	async fn find_latest_active(&self) -> Result<Option<RemoteSnapshot>, RemoteError> {
		Ok(None)
	}

	async fn delete_state(&self, _record_id: &str) -> Result<(), RemoteError> {
		Ok(())
	}

	async fn upsert_balances(&self, _state: &ProcessingState) -> Result<(), RemoteError> {
		Err(RemoteError::NotConfigured)
	}

	async fn load_balances(&self, _file_hash: &str) -> Result<Vec<CurrencyBalance>, RemoteError> {
		Ok(Vec::new())
	}

	async fn delete_balances(&self, _file_hash: &str) -> Result<(), RemoteError> {
		Ok(())
	}
}

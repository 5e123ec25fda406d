//!
//! REST client for the remote processing tables.
//!
//! Requests follow PostgREST conventions: filters are query parameters such as
//! `file_hash=eq.<hash>`, inserts ask for the created row back with
//! `Prefer: return=representation`, and balance upserts merge on the table's
//! unique key.

use super::RemoteStore;
use super::types::{RemoteBalanceRecord, RemoteError, RemoteSnapshot, RemoteStateRecord};
use crate::scan::types::{CurrencyBalance, ProcessingState};

use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, info};

const STATE_TABLE: &str = "processing_state";
const BALANCES_TABLE: &str = "currency_balances";
const ACTIVE_STATUSES: &str = "in.(processing,paused)";

/// Connection settings for `RestRemoteStore`.
#[derive(Debug, Clone)]
pub struct RestRemoteConfig {
	/// Base URL of the REST endpoint, e.g. `https://host/rest/v1`.
	pub base_url: String,
	pub api_key: String,
	/// Owner of the rows. Without a user every call fails with `NoUser`.
	pub user_id: Option<String>,
	pub timeout: Duration,
}

impl RestRemoteConfig {
	pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			api_key: api_key.into(),
			user_id: None,
			timeout: Duration::from_secs(30),
		}
	}

	pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}
}

/// PostgREST backed remote store
#[derive(Clone)]
pub struct RestRemoteStore {
	http_client: Client,
	config: RestRemoteConfig,
}

impl RestRemoteStore {
	/// Create a new remote store client.
	///
	/// # Errors
	/// Returns `RemoteError::Http` if the HTTP client cannot be built.
	pub fn new(config: RestRemoteConfig) -> Result<Self, RemoteError> {
		let http_client = Client::builder().timeout(config.timeout).build()?;
		Ok(Self {
			http_client,
			config,
		})
	}

	fn user(&self) -> Result<&str, RemoteError> {
		self.config
			.user_id
			.as_deref()
			.filter(|u| !u.is_empty())
			.ok_or(RemoteError::NoUser)
	}

	fn table_url(&self, table: &str) -> String {
		format!("{}/{}", self.config.base_url.trim_end_matches('/'), table)
	}

	fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
		request
			.header("apikey", &self.config.api_key)
			.bearer_auth(&self.config.api_key)
	}

	/// Fail on non-2xx responses, keeping the body for diagnostics.
	async fn check(response: Response) -> Result<Response, RemoteError> {
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		let body = response.text().await.unwrap_or_default();
		Err(RemoteError::Status {
			status: status.as_u16(),
			body,
		})
	}

	async fn query_active(
		&self,
		extra: &[(&str, String)],
	) -> Result<Option<RemoteSnapshot>, RemoteError> {
		let user = self.user()?;
		let mut query = vec![
			("select", "*".to_string()),
			("user_id", format!("eq.{}", user)),
			("status", ACTIVE_STATUSES.to_string()),
			("order", "last_update_time.desc".to_string()),
			("limit", "1".to_string()),
		];
		query.extend(extra.iter().cloned());

		let request = self.http_client.get(self.table_url(STATE_TABLE)).query(&query);
		let response = Self::check(self.authorized(request).send().await?).await?;
		let rows: Vec<RemoteStateRecord> = response.json().await?;

		Ok(rows.into_iter().next().and_then(|row| {
			let record_id = row.id.clone()?;
			Some(RemoteSnapshot {
				record_id,
				state: row.into_state(),
			})
		}))
	}
}

#[async_trait::async_trait]
impl RemoteStore for RestRemoteStore {
	fn is_configured(&self) -> bool {
		!self.config.base_url.is_empty() && self.user().is_ok()
	}

	async fn insert_state(&self, state: &ProcessingState) -> Result<String, RemoteError> {
		let record = RemoteStateRecord::from_state(self.user()?, state);

		let request = self
			.http_client
			.post(self.table_url(STATE_TABLE))
			.header("Prefer", "return=representation")
			.json(&[record]);
		let response = Self::check(self.authorized(request).send().await?).await?;
		let rows: Vec<RemoteStateRecord> = response.json().await?;

		let id = rows
			.into_iter()
			.next()
			.and_then(|row| row.id)
			.ok_or(RemoteError::MissingId)?;
		info!("Remote state created with id {}", id);
		Ok(id)
	}

	async fn update_state(&self, record_id: &str, state: &ProcessingState) -> Result<(), RemoteError> {
		let record = RemoteStateRecord::from_state(self.user()?, state);

		let request = self
			.http_client
			.patch(self.table_url(STATE_TABLE))
			.query(&[("id", format!("eq.{}", record_id))])
			.json(&record);
		Self::check(self.authorized(request).send().await?).await?;

		debug!(progress = state.progress(), "Remote state {} updated", record_id);
		Ok(())
	}

	async fn find_active_by_hash(
		&self,
		file_hash: &str,
	) -> Result<Option<RemoteSnapshot>, RemoteError> {
		self.query_active(&[("file_hash", format!("eq.{}", file_hash))])
			.await
	}

	async fn find_latest_active(&self) -> Result<Option<RemoteSnapshot>, RemoteError> {
		self.query_active(&[]).await
	}

	async fn delete_state(&self, record_id: &str) -> Result<(), RemoteError> {
		let user = self.user()?;
		let request = self
			.http_client
			.delete(self.table_url(STATE_TABLE))
			.query(&[
				("id", format!("eq.{}", record_id)),
				("user_id", format!("eq.{}", user)),
			]);
		Self::check(self.authorized(request).send().await?).await?;
		Ok(())
	}

	async fn upsert_balances(&self, state: &ProcessingState) -> Result<(), RemoteError> {
		let user = self.user()?;
		if state.balances.is_empty() {
			return Ok(());
		}

		let records: Vec<RemoteBalanceRecord> = state
			.balances
			.iter()
			.map(|b| RemoteBalanceRecord::from_balance(user, state, b))
			.collect();

		let request = self
			.http_client
			.post(self.table_url(BALANCES_TABLE))
			.query(&[("on_conflict", "user_id,file_hash,currency")])
			.header("Prefer", "resolution=merge-duplicates")
			.json(&records);
		Self::check(self.authorized(request).send().await?).await?;

		info!("Balances saved to remote ({} currencies)", records.len());
		Ok(())
	}

	async fn load_balances(&self, file_hash: &str) -> Result<Vec<CurrencyBalance>, RemoteError> {
		let user = self.user()?;
		let request = self
			.http_client
			.get(self.table_url(BALANCES_TABLE))
			.query(&[
				("select", "*".to_string()),
				("user_id", format!("eq.{}", user)),
				("file_hash", format!("eq.{}", file_hash)),
				("order", "total_amount.desc".to_string()),
			]);
		let response = Self::check(self.authorized(request).send().await?).await?;
		let rows: Vec<RemoteBalanceRecord> = response.json().await?;

		Ok(rows.into_iter().map(RemoteBalanceRecord::into_balance).collect())
	}

	async fn delete_balances(&self, file_hash: &str) -> Result<(), RemoteError> {
		let user = self.user()?;
		let request = self
			.http_client
			.delete(self.table_url(BALANCES_TABLE))
			.query(&[
				("user_id", format!("eq.{}", user)),
				("file_hash", format!("eq.{}", file_hash)),
			]);
		Self::check(self.authorized(request).send().await?).await?;
		Ok(())
	}
}

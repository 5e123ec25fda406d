//! Best-effort mirroring of the processing state to the remote store.
//!
//! `RemoteSyncCoordinator` debounces saves: a scheduled state is written at
//! once when the previous flush is at least `save_interval` old or the state
//! is terminal, otherwise it waits in a pending slot for a trailing timer.
//! Only the newest pending state is ever written. All writes run under one
//! async mutex, which also guards the remote row id, so two upserts are never
//! in flight together and the remote never moves backwards.
//!
//! Sync status changes are reported through a callback so the orchestrator can
//! apply them to its own state.

use crate::remote::{RemoteError, RemoteStore};
use crate::scan::types::{CurrencyBalance, ProcessingState, SyncStatus};
use crate::utils::lock;

use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Configuration for remote synchronization.
#[derive(Debug, Clone)]
pub struct RemoteSyncConfig {
    /// Minimum spacing between two remote writes of non-terminal states.
    pub save_interval: Duration,
    /// Attempts per save before giving up.
    pub max_retries: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
}

impl Default for RemoteSyncConfig {
    fn default() -> Self {
        Self {
            save_interval: Duration::from_secs(5),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Sync fields to apply to the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub sync_status: SyncStatus,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl SyncReport {
    /// Copy the report's fields into `state`.
    pub fn apply_to(&self, state: &mut ProcessingState) {
        state.sync_status = self.sync_status;
        state.last_sync_time = self.last_sync_time;
        state.retry_count = self.retry_count;
    }
}

/// Callback receiving sync status changes.
pub type SyncStatusSink = Arc<dyn Fn(&SyncReport) + Send + Sync>;

/// Coordinates remote saves for the orchestrator.
pub struct RemoteSyncCoordinator {
    remote: Arc<dyn RemoteStore>,
    config: RemoteSyncConfig,
    sink: SyncStatusSink,
    /// Remote row of the current run. Held for the whole duration of a write.
    record_id: tokio::sync::Mutex<Option<String>>,
    pending: Mutex<Option<ProcessingState>>,
    last_flush: Mutex<Option<Instant>>,
    /// Bumped on every `schedule`; a trailing timer only flushes if it is
    /// still the newest.
    generation: AtomicU64,
}

impl RemoteSyncCoordinator {
    pub fn new(remote: Arc<dyn RemoteStore>, config: RemoteSyncConfig, sink: SyncStatusSink) -> Self {
        Self {
            remote,
            config,
            sink,
            record_id: tokio::sync::Mutex::new(None),
            pending: Mutex::new(None),
            last_flush: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.remote.is_configured()
    }

    /// Queue `state` for a remote save, debounced by `save_interval`.
    pub fn schedule(self: &Arc<Self>, state: ProcessingState) {
        let terminal = state.status.is_terminal();
        *lock(&self.pending) = Some(state);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let last_flush = *lock(&self.last_flush);
        let wait = last_flush
            .map(|last| self.config.save_interval.saturating_sub(last.elapsed()))
            .unwrap_or(Duration::ZERO);

        let coordinator = Arc::clone(self);
        if terminal || wait.is_zero() {
            tokio::spawn(async move {
                coordinator.flush_pending().await;
            });
        } else {
            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                if coordinator.generation.load(Ordering::SeqCst) == generation {
                    coordinator.flush_pending().await;
                }
            });
        }
    }

    /// Write the pending state now, if any. Waits for an in-flight write first.
    pub async fn flush_pending(&self) -> Option<SyncReport> {
        let mut record_id = self.record_id.lock().await;
        let state = lock(&self.pending).take()?;
        *lock(&self.last_flush) = Some(Instant::now());
        Some(self.save_locked(&mut record_id, &state).await)
    }

    /// Save `state` immediately, retrying with exponential backoff.
    pub async fn save_with_retry(&self, state: &ProcessingState) -> SyncReport {
        let mut record_id = self.record_id.lock().await;
        self.save_locked(&mut record_id, state).await
    }

    fn report(&self, report: SyncReport) -> SyncReport {
        (self.sink)(&report);
        report
    }

    async fn save_locked(&self, record_id: &mut Option<String>, state: &ProcessingState) -> SyncReport {
        if !self.remote.is_configured() {
            debug!("Remote store not configured, state kept locally");
            return self.report(SyncReport {
                sync_status: SyncStatus::LocalOnly,
                last_sync_time: state.last_sync_time,
                retry_count: state.retry_count,
            });
        }

        self.report(SyncReport {
            sync_status: SyncStatus::Syncing,
            last_sync_time: state.last_sync_time,
            retry_count: state.retry_count,
        });

        match self.upsert_with_backoff(record_id.clone(), state).await {
            Ok(id) => {
                *record_id = Some(id);
                self.report(SyncReport {
                    sync_status: SyncStatus::Synced,
                    last_sync_time: Some(Utc::now()),
                    retry_count: 0,
                })
            }
            Err(RemoteError::NotConfigured | RemoteError::NoUser) => self.report(SyncReport {
                sync_status: SyncStatus::LocalOnly,
                last_sync_time: state.last_sync_time,
                retry_count: state.retry_count,
            }),
            Err(e) => {
                error!(
                    "Remote save failed after {} attempts: {}",
                    self.config.max_retries, e
                );
                self.report(SyncReport {
                    sync_status: SyncStatus::Error,
                    last_sync_time: state.last_sync_time,
                    retry_count: state.retry_count + 1,
                })
            }
        }
    }

    /// Insert or update the remote row, returning its id.
    async fn upsert_with_backoff(
        &self,
        current_id: Option<String>,
        state: &ProcessingState,
    ) -> Result<String, RemoteError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_secs(60))
            .with_max_elapsed_time(None)
            .build();

        let remote = &self.remote;
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_retries = self.config.max_retries.max(1);

        backoff::future::retry(policy, || {
            let id = current_id.clone();
            async move {
                let result = match id {
                    Some(id) => remote.update_state(&id, state).await.map(|()| id),
                    None => remote.insert_state(state).await,
                };

                result.map_err(|e| {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if !e.is_retryable() || attempt >= max_retries {
                        backoff::Error::permanent(e)
                    } else {
                        warn!(attempt, "Remote save failed, retrying: {}", e);
                        backoff::Error::transient(e)
                    }
                })
            }
        })
        .await
    }

    /// Look up an in-flight remote record for `file_hash` and adopt its row id
    /// for later saves. Lookup failures are logged and treated as absent.
    pub async fn find_active(&self, file_hash: &str) -> Option<ProcessingState> {
        let mut record_id = self.record_id.lock().await;
        *record_id = None;
        if !self.remote.is_configured() {
            return None;
        }

        match self.remote.find_active_by_hash(file_hash).await {
            Ok(Some(snapshot)) => {
                info!(
                    progress = snapshot.state.progress(),
                    "Found in-flight remote state for this file"
                );
                *record_id = Some(snapshot.record_id);
                Some(snapshot.state)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to look up remote state: {}", e);
                None
            }
        }
    }

    /// Newest in-flight remote record of any file, adopting its row id.
    pub async fn load_latest_active(&self) -> Option<ProcessingState> {
        if !self.remote.is_configured() {
            return None;
        }

        let mut record_id = self.record_id.lock().await;
        match self.remote.find_latest_active().await {
            Ok(Some(snapshot)) => {
                *record_id = Some(snapshot.record_id);
                Some(snapshot.state)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load remote state: {}", e);
                None
            }
        }
    }

    /// Delete the current run's remote row and forget its id.
    pub async fn delete_current(&self) {
        let mut record_id = self.record_id.lock().await;
        lock(&self.pending).take();

        if let Some(id) = record_id.take() {
            match self.remote.delete_state(&id).await {
                Ok(()) => info!("Deleted remote state {}", id),
                Err(e) => warn!("Failed to delete remote state {}: {}", id, e),
            }
        }
    }

    /// Upsert the per-currency rows for `state`. Failures are logged.
    pub async fn sync_balances(&self, state: &ProcessingState) {
        if !self.remote.is_configured() || state.file_hash.is_empty() {
            return;
        }
        if let Err(e) = self.remote.upsert_balances(state).await {
            error!("Failed to save balances remotely: {}", e);
        }
    }

    pub async fn load_balances(&self, file_hash: &str) -> Vec<CurrencyBalance> {
        if !self.remote.is_configured() {
            return Vec::new();
        }
        self.remote.load_balances(file_hash).await.unwrap_or_else(|e| {
            warn!("Failed to load remote balances: {}", e);
            Vec::new()
        })
    }

    pub async fn delete_balances(&self, file_hash: &str) {
        if !self.remote.is_configured() {
            return;
        }
        if let Err(e) = self.remote.delete_balances(file_hash).await {
            warn!("Failed to delete remote balances: {}", e);
        }
    }
}

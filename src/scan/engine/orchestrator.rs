//! Scan orchestrator and integration point for all engine services.
//!
//! This module defines the `ScanOrchestrator`, the long-lived service that owns
//! the current `ProcessingState` and runs the chunked scan loop. It wires
//! together:
//!
//! - the pattern extractor and balance aggregator
//! - `StatePersistenceService` for snapshots and throttled checkpoints
//! - `RemoteSyncCoordinator` for debounced remote saves
//! - `EventDispatcher` for listener fan-out
//! - `ScanControl` for cooperative pause and abort
//!
//! The orchestrator is the only writer of the processing state. Stores and
//! listeners receive clones. Remote sync status comes back through a callback
//! and is applied here.

use crate::remote::RemoteStore;
use crate::scan::aggregator::BalanceAggregator;
use crate::scan::engine::{
    control::ScanControl,
    events::{EventDispatcher, ScanEvent, ScanEventHandler, Subscription},
    progress_tracker::{ProgressAction, ScanProgressTracker},
    remote_sync::{RemoteSyncConfig, RemoteSyncCoordinator, SyncReport, SyncStatusSink},
    state_persistence::{CheckpointConfig, CheckpointOutcome, StatePersistenceService},
};
use crate::scan::extractor::extract_balances;
use crate::scan::hashing::compute_file_hash;
use crate::scan::source::ScanSource;
use crate::scan::types::{
    CurrencyBalance, ProcessingCheckpoint, ProcessingState, ProcessingStatus, ScanError,
    SyncStatus, progress_for,
};
use crate::storage::{CheckpointRepository, StateSnapshotRepository, StorageStats};
use crate::utils::{format_gigabytes, format_percent, lock};

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Configuration for the scan loop.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Chunk size for files up to `large_file_threshold`.
    pub chunk_size: u64,
    pub large_file_threshold: u64,
    pub large_chunk_size: u64,
    pub huge_file_threshold: u64,
    pub huge_chunk_size: u64,
    /// Sleep for `yield_sleep` every N chunks; other chunks only yield.
    pub yield_every: u64,
    pub yield_sleep: Duration,
    /// Warn every N skipped chunks.
    pub chunk_error_warn_every: u64,
    /// Fresh runs over files up to this size copy each chunk into the chunk
    /// cache. Zero disables caching.
    pub chunk_cache_limit: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10 * MIB,
            large_file_threshold: 100 * GIB,
            large_chunk_size: 50 * MIB,
            huge_file_threshold: 500 * GIB,
            huge_chunk_size: 100 * MIB,
            yield_every: 50,
            yield_sleep: Duration::from_millis(10),
            chunk_error_warn_every: 100,
            chunk_cache_limit: 2 * GIB,
        }
    }
}

impl ScanConfig {
    /// Adaptive chunk size for a file of `file_size` bytes.
    pub fn chunk_size_for(&self, file_size: u64) -> u64 {
        let chunk = if file_size > self.huge_file_threshold {
            self.huge_chunk_size
        } else if file_size > self.large_file_threshold {
            self.large_chunk_size
        } else {
            self.chunk_size
        };
        chunk.max(1)
    }
}

/// Collaborators injected into the orchestrator.
#[derive(Clone)]
pub struct ScanServices {
    pub checkpoints: Arc<dyn CheckpointRepository>,
    pub snapshots: Arc<dyn StateSnapshotRepository>,
    pub remote: Arc<dyn RemoteStore>,
}

/// How a call to `start_global_processing` ended.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Completed(ProcessingState),
    /// Stopped by `stop_processing` or `clear_state`; resumable.
    Stopped { bytes_processed: u64 },
    /// A fatal fault; the state is `error`.
    Failed { message: String },
    /// Another scan was already active. Nothing changed.
    Rejected,
}

/// Where a run starts and what it already knows.
struct ResumePoint {
    offset: u64,
    aggregator: BalanceAggregator,
    /// State to continue instead of creating a new one.
    existing: Option<ProcessingState>,
}

/// Main scan orchestrator that coordinates all engine components.
pub struct ScanOrchestrator {
    config: ScanConfig,

    // Services
    persistence: Arc<StatePersistenceService>,
    remote_sync: Arc<RemoteSyncCoordinator>,
    dispatcher: Arc<EventDispatcher>,

    state: Mutex<Option<ProcessingState>>,
    active: AtomicBool,
    /// Signalled once a run has fully wound down and `active` is clear.
    run_finished: Notify,
    control: Mutex<Arc<ScanControl>>,
    auto_checkpoint: Mutex<Option<JoinHandle<()>>>,
}

impl ScanOrchestrator {
    /// Create a new orchestrator with the given services and configuration.
    pub fn new(
        services: ScanServices,
        config: ScanConfig,
        checkpoint_config: CheckpointConfig,
        sync_config: RemoteSyncConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let sink: SyncStatusSink = Arc::new({
                let weak = weak.clone();
                move |report: &SyncReport| {
                    if let Some(orchestrator) = weak.upgrade() {
                        orchestrator.apply_sync_report(report);
                    }
                }
            });

            Self {
                config,
                persistence: Arc::new(StatePersistenceService::new(
                    services.checkpoints,
                    services.snapshots,
                    checkpoint_config,
                )),
                remote_sync: Arc::new(RemoteSyncCoordinator::new(
                    services.remote,
                    sync_config,
                    sink,
                )),
                dispatcher: Arc::new(EventDispatcher::new()),
                state: Mutex::new(None),
                active: AtomicBool::new(false),
                run_finished: Notify::new(),
                control: Mutex::new(Arc::new(ScanControl::new())),
                auto_checkpoint: Mutex::new(None),
            }
        })
    }

    /// Create an orchestrator with default configuration.
    pub fn with_defaults(services: ScanServices) -> Arc<Self> {
        Self::new(
            services,
            ScanConfig::default(),
            CheckpointConfig::default(),
            RemoteSyncConfig::default(),
        )
    }

    /// Scan `source` from the recovered or given offset to the end.
    ///
    /// With `resume_from == 0` the run continues from the most advanced local
    /// checkpoint or in-flight remote record for the same file, if any.
    /// Returns `Rejected` without side effects while another scan is active.
    pub async fn start_global_processing(
        self: &Arc<Self>,
        source: Arc<dyn ScanSource>,
        resume_from: u64,
    ) -> ScanOutcome {
        if self.active.swap(true, Ordering::SeqCst) {
            warn!("A scan is already active, ignoring new request");
            return ScanOutcome::Rejected;
        }

        let control = Arc::new(ScanControl::new());
        *lock(&self.control) = control.clone();

        let outcome = match self.run_scan(source.as_ref(), resume_from, &control).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail(e).await,
        };

        self.stop_auto_checkpoint();
        self.remote_sync.flush_pending().await;
        self.active.store(false, Ordering::SeqCst);
        self.run_finished.notify_waiters();

        outcome
    }

    async fn run_scan(
        self: &Arc<Self>,
        source: &dyn ScanSource,
        resume_from: u64,
        control: &ScanControl,
    ) -> Result<ScanOutcome, ScanError> {
        let file_size = source.size();
        info!(
            file = %source.name(),
            size = %format_gigabytes(file_size),
            "Starting scan"
        );

        let file_hash = compute_file_hash(source).await;
        self.persistence.reset_checkpoint_clock();

        let chunk_size = self.config.chunk_size_for(file_size);
        let total_chunks = file_size.div_ceil(chunk_size);
        let resume = self.recover(&file_hash, file_size, resume_from).await;

        let mut state = resume.existing.unwrap_or_else(|| {
            ProcessingState::new(
                source.name(),
                file_size,
                &file_hash,
                source.last_modified_ms(),
                total_chunks,
            )
        });
        state.file_name = source.name().to_string();
        state.file_size = file_size;
        state.file_hash = file_hash.clone();
        state.file_last_modified = source.last_modified_ms();
        state.total_chunks = total_chunks;
        state.set_bytes_processed(resume.offset);
        state.chunk_index = resume.offset / chunk_size;
        state.balances = resume.aggregator.sorted_balances();
        state.status = ProcessingStatus::Processing;
        state.error_message = None;
        state.sync_status = SyncStatus::Syncing;
        state.touch();

        *lock(&self.state) = Some(state.clone());
        self.dispatcher
            .dispatch(&ScanEvent::StateChanged(Some(state.clone())));
        if let Err(e) = self.persistence.save_metadata(&state, None).await {
            warn!("Failed to save file metadata: {}", e);
        }

        if file_size == 0 {
            return Err(ScanError::InvalidFileSize(file_size));
        }

        self.save_snapshot(&state).await;
        self.remote_sync.schedule(state.clone());
        self.start_auto_checkpoint();

        let mut cache_chunks = resume_from == 0
            && resume.offset == 0
            && file_size <= self.config.chunk_cache_limit;
        let mut chunks_cached: u64 = 0;

        let mut aggregator = resume.aggregator;
        let mut offset = resume.offset.min(file_size);
        let mut chunk_index = offset / chunk_size;
        let mut tracker = ScanProgressTracker::new(offset, self.config.chunk_error_warn_every);
        let mut chunks_this_run: u64 = 0;

        info!(
            progress = %format_percent(progress_for(offset, file_size)),
            chunk_size,
            total_chunks,
            "Scanning from byte {}", offset
        );

        while offset < file_size {
            if !control.wait_while_paused().await {
                break;
            }

            let end = (offset + chunk_size).min(file_size);
            match source.read_range(offset, (end - offset) as usize).await {
                Ok(bytes) => {
                    let matches = extract_balances(&bytes, &mut aggregator);
                    tracker.record_chunk(end, matches);
                    if cache_chunks {
                        match self
                            .persistence
                            .cache_chunk(&file_hash, chunk_index, bytes)
                            .await
                        {
                            Ok(()) => chunks_cached += 1,
                            Err(e) => {
                                warn!(
                                    "Failed to cache chunk {}, caching disabled: {}",
                                    chunk_index, e
                                );
                                cache_chunks = false;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(offset, "Failed to process chunk {}: {}", chunk_index, e);
                    tracker.record_chunk_error(end);
                }
            }
            offset = end;
            chunk_index += 1;

            if control.is_aborted() {
                break;
            }

            let progress = progress_for(offset, file_size);
            match tracker.observe(progress) {
                ProgressAction::None => {}
                ProgressAction::Notify => {
                    if let Some(snapshot) =
                        self.update_progress(offset, chunk_index, &aggregator)
                    {
                        self.dispatcher
                            .dispatch(&ScanEvent::StateChanged(Some(snapshot)));
                    }
                }
                ProgressAction::Persist => {
                    if let Some(snapshot) =
                        self.update_progress(offset, chunk_index, &aggregator)
                    {
                        self.persist(snapshot).await;
                    }
                }
            }
            tracker.log_progress(progress, file_size, false);

            chunks_this_run += 1;
            if chunks_this_run % self.config.yield_every.max(1) == 0 {
                tokio::time::sleep(self.config.yield_sleep).await;
            } else {
                tokio::task::yield_now().await;
            }
        }

        if chunks_cached > 0 {
            if let Err(e) = self
                .persistence
                .save_metadata(&state, Some(chunks_cached))
                .await
            {
                warn!("Failed to save file metadata: {}", e);
            }
        }

        if control.is_aborted() {
            let bytes_processed = self.state().map(|s| s.bytes_processed()).unwrap_or(0);
            info!(
                bytes_processed,
                "Scan stopped: {}",
                tracker.get_stats().summary()
            );
            return Ok(ScanOutcome::Stopped { bytes_processed });
        }

        match self.complete_processing(&aggregator).await {
            Some(state) => {
                info!("Scan completed: {}", tracker.get_stats().summary());
                Ok(ScanOutcome::Completed(state))
            }
            None => Ok(ScanOutcome::Stopped {
                bytes_processed: offset,
            }),
        }
    }

    /// Choose the starting offset and balances for a run.
    async fn recover(&self, file_hash: &str, file_size: u64, resume_from: u64) -> ResumePoint {
        if resume_from > 0 {
            let existing = self.state().filter(|s| s.file_hash == file_hash);
            let aggregator = existing
                .as_ref()
                .map(|s| BalanceAggregator::from_balances(&s.balances))
                .unwrap_or_default();
            info!("Resuming from caller supplied offset {}", resume_from);
            return ResumePoint {
                offset: resume_from.min(file_size),
                aggregator,
                existing,
            };
        }

        let local = match self.persistence.load_resume_checkpoint(file_hash).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!("Failed to load local checkpoint: {}", e);
                None
            }
        };
        let remote = self.remote_sync.find_active(file_hash).await;

        let local_bytes = local.as_ref().map(|c| c.bytes_processed);
        let remote_bytes = remote.as_ref().map(|s| s.bytes_processed());

        match (local, remote) {
            (_, Some(remote)) if remote_bytes >= local_bytes => {
                info!(
                    progress = %format_percent(remote.progress()),
                    "Recovered in-flight remote state"
                );
                ResumePoint {
                    offset: remote.bytes_processed(),
                    aggregator: BalanceAggregator::from_balances(&remote.balances),
                    existing: Some(remote),
                }
            }
            (Some(checkpoint), _) => {
                info!(
                    progress = %format_percent(checkpoint.progress),
                    "Recovered local checkpoint ({} processed)",
                    format_gigabytes(checkpoint.bytes_processed)
                );
                ResumePoint {
                    offset: checkpoint.bytes_processed,
                    aggregator: BalanceAggregator::from_balances(&checkpoint.balances),
                    existing: None,
                }
            }
            _ => ResumePoint {
                offset: 0,
                aggregator: BalanceAggregator::new(),
                existing: None,
            },
        }
    }

    /// Move the in-memory state to `offset`. Returns the new snapshot, or
    /// `None` if the state was cleared meanwhile.
    fn update_progress(
        &self,
        offset: u64,
        chunk_index: u64,
        aggregator: &BalanceAggregator,
    ) -> Option<ProcessingState> {
        let mut guard = lock(&self.state);
        let state = guard.as_mut()?;
        state.set_bytes_processed(offset);
        state.chunk_index = chunk_index;
        state.balances = aggregator.sorted_balances();
        state.touch();
        Some(state.clone())
    }

    /// Snapshot, notify, checkpoint (throttled) and schedule a remote save.
    async fn persist(&self, state: ProcessingState) {
        self.save_snapshot(&state).await;
        self.dispatcher
            .dispatch(&ScanEvent::StateChanged(Some(state.clone())));
        self.persistence.checkpoint(&state, false).await;
        self.remote_sync.schedule(state);
    }

    async fn save_snapshot(&self, state: &ProcessingState) {
        if let Err(e) = self.persistence.save_snapshot(state).await {
            error!("Failed to save state snapshot: {}", e);
        }
    }

    /// Write a terminal state everywhere without throttling.
    async fn persist_terminal(&self, state: &ProcessingState) {
        self.save_snapshot(state).await;
        self.dispatcher
            .dispatch(&ScanEvent::StateChanged(Some(state.clone())));
        self.persistence.checkpoint(state, true).await;
        self.remote_sync.schedule(state.clone());
        self.remote_sync.flush_pending().await;
    }

    async fn complete_processing(&self, aggregator: &BalanceAggregator) -> Option<ProcessingState> {
        let state = {
            let mut guard = lock(&self.state);
            let state = guard.as_mut()?;
            let size = state.file_size;
            state.set_bytes_processed(size);
            state.chunk_index = state.total_chunks;
            state.balances = aggregator.sorted_balances();
            state.status = ProcessingStatus::Completed;
            state.touch();
            state.clone()
        };

        self.persist_terminal(&state).await;
        self.remote_sync.sync_balances(&state).await;

        Some(self.state().unwrap_or(state))
    }

    /// Record a fatal fault on the current state.
    async fn fail(&self, e: ScanError) -> ScanOutcome {
        error!("Scan failed: {}", e);
        let message = e.to_string();

        let snapshot = {
            let mut guard = lock(&self.state);
            guard.as_mut().map(|state| {
                state.status = ProcessingStatus::Error;
                state.error_message = Some(message.clone());
                state.touch();
                state.clone()
            })
        };
        if let Some(state) = snapshot {
            self.persist_terminal(&state).await;
        }

        ScanOutcome::Failed { message }
    }

    /// Apply a remote sync report to the current state and notify listeners.
    fn apply_sync_report(&self, report: &SyncReport) {
        let snapshot = {
            let mut guard = lock(&self.state);
            match guard.as_mut() {
                Some(state)
                    if state.sync_status != report.sync_status
                        || state.retry_count != report.retry_count
                        || state.last_sync_time != report.last_sync_time =>
                {
                    report.apply_to(state);
                    Some(state.clone())
                }
                _ => None,
            }
        };

        if let Some(state) = snapshot {
            self.dispatcher
                .dispatch(&ScanEvent::StateChanged(Some(state)));
        }
    }

    /// Set the status of the current state and return the snapshot.
    fn set_status(&self, status: ProcessingStatus) -> Option<ProcessingState> {
        let mut guard = lock(&self.state);
        let state = guard.as_mut()?;
        state.status = status;
        state.touch();
        Some(state.clone())
    }

    pub async fn pause_processing(&self) {
        lock(&self.control).pause();

        let snapshot = self
            .state()
            .filter(|s| s.status == ProcessingStatus::Processing)
            .and_then(|_| self.set_status(ProcessingStatus::Paused));
        if let Some(state) = snapshot {
            info!(progress = %format_percent(state.progress()), "Scan paused");
            self.save_snapshot(&state).await;
            self.dispatcher
                .dispatch(&ScanEvent::StateChanged(Some(state.clone())));
            self.persistence.checkpoint(&state, true).await;
            self.remote_sync.schedule(state);
        }
    }

    pub async fn resume_processing(&self) {
        let snapshot = self
            .state()
            .filter(|s| s.status == ProcessingStatus::Paused)
            .and_then(|_| self.set_status(ProcessingStatus::Processing));
        lock(&self.control).resume();

        if let Some(state) = snapshot {
            info!(progress = %format_percent(state.progress()), "Scan resumed");
            self.save_snapshot(&state).await;
            self.dispatcher
                .dispatch(&ScanEvent::StateChanged(Some(state.clone())));
            self.remote_sync.schedule(state);
        }
    }

    /// Abort the running loop. The state is kept and marked paused so a later
    /// run can resume it.
    pub async fn stop_processing(&self) {
        lock(&self.control).abort();
        self.stop_auto_checkpoint();

        let snapshot = self
            .state()
            .filter(|s| s.status == ProcessingStatus::Processing)
            .and_then(|_| self.set_status(ProcessingStatus::Paused));
        if let Some(state) = snapshot {
            info!(progress = %format_percent(state.progress()), "Scan stopped");
            self.save_snapshot(&state).await;
            self.dispatcher
                .dispatch(&ScanEvent::StateChanged(Some(state.clone())));
            self.persistence.checkpoint(&state, true).await;
            self.remote_sync.schedule(state);
        }
    }

    /// Drop the current state everywhere except the checkpoint store. A
    /// running scan is aborted and has wound down before anything is removed.
    pub async fn clear_state(&self) {
        lock(&self.control).abort();
        self.stop_auto_checkpoint();
        self.wait_for_run_exit().await;

        self.remote_sync.flush_pending().await;
        self.remote_sync.delete_current().await;

        *lock(&self.state) = None;
        if let Err(e) = self.persistence.clear_snapshot().await {
            warn!("Failed to clear state snapshot: {}", e);
        }

        info!("Processing state cleared");
        self.dispatcher.dispatch(&ScanEvent::StateChanged(None));
    }

    async fn wait_for_run_exit(&self) {
        loop {
            // Register before checking the flag so a wake-up is not missed.
            let mut finished = pin!(self.run_finished.notified());
            finished.as_mut().enable();
            if !self.has_active_processing() {
                return;
            }
            finished.await;
        }
    }

    /// Recovery read on start-up: the newest in-flight remote state, then the
    /// local snapshot. A `processing` state with no running scan is reported
    /// as `paused`.
    pub async fn load_state(&self) -> Option<ProcessingState> {
        if let Some(state) = self.state() {
            return Some(state);
        }

        let loaded = match self.remote_sync.load_latest_active().await {
            Some(state) => Some(state),
            None => self.persistence.load_snapshot().await.unwrap_or_else(|e| {
                warn!("Failed to load state snapshot: {}", e);
                None
            }),
        };

        let mut state = loaded?;
        if state.status == ProcessingStatus::Processing && !self.has_active_processing() {
            state.status = ProcessingStatus::Paused;
        }

        *lock(&self.state) = Some(state.clone());
        self.dispatcher
            .dispatch(&ScanEvent::StateChanged(Some(state.clone())));
        Some(state)
    }

    /// Register a listener. It immediately receives the current state.
    pub fn subscribe<H>(&self, handler: H) -> Subscription
    where
        H: ScanEventHandler + 'static,
    {
        let handler: Arc<dyn ScanEventHandler> = Arc::new(handler);
        EventDispatcher::deliver(handler.as_ref(), &ScanEvent::StateChanged(self.state()));
        self.dispatcher.register_handler(handler)
    }

    pub fn state(&self) -> Option<ProcessingState> {
        lock(&self.state).clone()
    }

    pub fn has_active_processing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        lock(&self.state)
            .as_ref()
            .is_some_and(|s| s.status == ProcessingStatus::Processing)
    }

    pub async fn get_last_checkpoint(
        &self,
        file_hash: &str,
    ) -> Result<Option<ProcessingCheckpoint>, ScanError> {
        self.persistence.load_last_checkpoint(file_hash).await
    }

    pub async fn persistent_storage_stats(&self) -> Result<StorageStats, ScanError> {
        self.persistence.stats().await
    }

    /// Balances recorded for a file: the remote rows when there are any,
    /// otherwise those of the newest local checkpoint.
    pub async fn file_balances(&self, file_hash: &str) -> Result<Vec<CurrencyBalance>, ScanError> {
        let remote = self.remote_sync.load_balances(file_hash).await;
        if !remote.is_empty() {
            return Ok(remote);
        }
        Ok(self
            .persistence
            .load_last_checkpoint(file_hash)
            .await?
            .map(|c| c.balances)
            .unwrap_or_default())
    }

    /// Remove everything stored for a file: local checkpoints, cached chunks
    /// and remote balances.
    pub async fn forget_file(&self, file_hash: &str) -> Result<(), ScanError> {
        self.persistence.delete_checkpoints(file_hash).await?;
        self.persistence.delete_cached_chunks(file_hash).await?;
        self.remote_sync.delete_balances(file_hash).await;
        Ok(())
    }

    /// Clear the current state, then wipe all local checkpoints, metadata and
    /// cached chunks.
    pub async fn clear_storage(&self) -> Result<(), ScanError> {
        self.clear_state().await;
        self.persistence.clear_all().await?;
        info!("Local scan storage cleared");
        Ok(())
    }

    /// Checkpoint the current state if a scan is in flight.
    pub async fn save_checkpoint_now(&self, force: bool) -> Option<CheckpointOutcome> {
        let state = self.state().filter(|s| s.status.is_active())?;
        Some(self.persistence.checkpoint(&state, force).await)
    }

    /// Teardown path: flush the pending remote save and force a checkpoint.
    pub async fn shutdown(&self) {
        self.stop_auto_checkpoint();
        self.remote_sync.flush_pending().await;
        if let Some(CheckpointOutcome::Written(checkpoint)) = self.save_checkpoint_now(true).await {
            info!(
                progress = %format_percent(checkpoint.progress),
                "Final checkpoint written on shutdown"
            );
        }
    }

    /// Ask hosts to surface a paused scan. Returns whether an event was sent.
    pub fn request_resume_surface(&self) -> bool {
        let Some(state) = self
            .state()
            .filter(|s| s.status == ProcessingStatus::Paused)
        else {
            return false;
        };

        let progress = state.progress();
        self.dispatcher.dispatch(&ScanEvent::NavigateToAnalyzer {
            file_hash: state.file_hash,
            progress,
        });
        true
    }

    fn start_auto_checkpoint(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self
            .persistence
            .config()
            .auto_interval
            .max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(orchestrator) = weak.upgrade() else {
                    break;
                };
                orchestrator.save_checkpoint_now(false).await;
            }
        });

        if let Some(previous) = lock(&self.auto_checkpoint).replace(handle) {
            previous.abort();
        }
    }

    fn stop_auto_checkpoint(&self) {
        if let Some(handle) = lock(&self.auto_checkpoint).take() {
            handle.abort();
        }
    }
}

impl Drop for ScanOrchestrator {
    fn drop(&mut self) {
        self.stop_auto_checkpoint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_adapts_to_file_size() {
        let config = ScanConfig::default();
        assert_eq!(config.chunk_size_for(GIB), 10 * MIB);
        assert_eq!(config.chunk_size_for(100 * GIB), 10 * MIB);
        assert_eq!(config.chunk_size_for(100 * GIB + 1), 50 * MIB);
        assert_eq!(config.chunk_size_for(500 * GIB + 1), 100 * MIB);
    }
}

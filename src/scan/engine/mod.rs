//! Scan Engine Module
//!
//! This module provides the runtime that drives a resumable scan over a large binary file.
//! It is composed of several submodules, each responsible for a specific aspect of a run:
//!
//! - `orchestrator`: The main entry point. It owns the processing state and runs the chunk loop.
//! - `events`: Event types, the listener trait and the dispatcher with scoped subscriptions.
//! - `control`: Cooperative pause, resume and abort signalling for the chunk loop.
//! - `progress_tracker`: Throttles progress updates and keeps per-run statistics.
//! - `state_persistence`: Local snapshot, checkpoint and metadata writes with throttling and retention.
//! - `remote_sync`: Debounced remote saves with bounded exponential backoff.
//!
//! The orchestrator reads chunks from a `ScanSource`, feeds them to the extractor, and hands the
//! resulting state to the persistence and sync services at whole-percent boundaries.

/// Pause and abort signalling
pub mod control;
/// Event system for state change notifications
pub mod events;
/// Main coordinator for a scan run
pub mod orchestrator;
/// Progress throttling and run statistics
pub mod progress_tracker;
/// Debounced remote state sync
pub mod remote_sync;
/// Local persistence of snapshots and checkpoints
pub mod state_persistence;

pub use events::{ScanEvent, ScanEventHandler, Subscription};
pub use orchestrator::*;
pub use remote_sync::RemoteSyncConfig;
pub use state_persistence::{CheckpointConfig, CheckpointOutcome};

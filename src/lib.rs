//! Resumable scanning of large binary files for currency balance records.
//!
//! The [`scan`] module holds the extractor and the engine that drives a run,
//! [`storage`] keeps checkpoints and the state snapshot on disk, and
//! [`remote`] mirrors in-flight state to a REST store.

pub mod remote;
pub mod scan;
pub mod storage;
pub mod utils;

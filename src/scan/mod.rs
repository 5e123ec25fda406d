pub mod aggregator;
pub mod currency;
pub mod engine;
pub mod extractor;
pub mod hashing;
pub mod source;
pub mod types;

pub use engine::ScanOrchestrator;
pub use source::{FileSource, MemorySource, ScanSource};
pub use types::*;

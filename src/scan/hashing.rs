use crate::scan::source::ScanSource;
use crate::scan::types::ScanError;

use sha2::{Digest, Sha256};
use tracing::warn;

const SAMPLE_SIZE: u64 = 1024 * 1024;

/// Identity of a file across restarts.
///
/// Hashes up to three 1 MiB samples (head, middle, tail) rather than the whole
/// file, then appends the size and modification time. Read failures fall back
/// to a name based identity.
pub async fn compute_file_hash(source: &dyn ScanSource) -> String {
	let size = source.size();
	let modified = source.last_modified_ms();

	match sample_digest(source).await {
		Ok(digest) => format!("{}-{}-{}", digest, size, modified),
		Err(e) => {
			warn!("Failed to hash {}: {}, using fallback identity", source.name(), e);
			format!("fallback-{}-{}-{}", source.name(), size, modified)
		}
	}
}

async fn sample_digest(source: &dyn ScanSource) -> Result<String, ScanError> {
	let size = source.size();
	let mut hasher = Sha256::new();

	for (offset, len) in sample_ranges(size) {
		let bytes = source.read_range(offset, len as usize).await?;
		hasher.update(&bytes);
	}

	Ok(hex::encode(hasher.finalize()))
}

/// The `(offset, len)` samples hashed for a file of `size` bytes.
fn sample_ranges(size: u64) -> Vec<(u64, u64)> {
	let mut ranges = vec![(0, size.min(SAMPLE_SIZE))];

	if size > 2 * SAMPLE_SIZE {
		ranges.push((size / 2, SAMPLE_SIZE));
	}
	if size > SAMPLE_SIZE {
		let start = size - SAMPLE_SIZE;
		ranges.push((start, SAMPLE_SIZE));
	}

	ranges
}

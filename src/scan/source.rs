use crate::scan::types::ScanError;

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

/// Random-access byte source for a scan.
#[async_trait::async_trait]
pub trait ScanSource: Send + Sync {
	fn name(&self) -> &str;

	fn size(&self) -> u64;

	/// Last modification time in Unix milliseconds.
	fn last_modified_ms(&self) -> i64;

	/// Read `len` bytes starting at `offset`. Short reads are errors.
	async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>, ScanError>;
}

/// A file on disk.
pub struct FileSource {
	name: String,
	size: u64,
	last_modified_ms: i64,
	file: Mutex<tokio::fs::File>,
}

impl FileSource {
	pub async fn open(path: impl AsRef<Path>) -> Result<Self, ScanError> {
		let path = path.as_ref();
		let file = tokio::fs::File::open(path).await?;
		let metadata = file.metadata().await?;

		let last_modified_ms = metadata
			.modified()
			.ok()
			.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
			.map(|d| d.as_millis() as i64)
			.unwrap_or(0);

		let name = path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| path.display().to_string());

		Ok(Self {
			name,
			size: metadata.len(),
			last_modified_ms,
			file: Mutex::new(file),
		})
	}
}

#[async_trait::async_trait]
impl ScanSource for FileSource {
	fn name(&self) -> &str {
		&self.name
	}

	fn size(&self) -> u64 {
		self.size
	}

	fn last_modified_ms(&self) -> i64 {
		self.last_modified_ms
	}

	async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>, ScanError> {
		let mut file = self.file.lock().await;
		let mut buf = vec![0u8; len];

		file.seek(SeekFrom::Start(offset))
			.await
			.map_err(|e| ScanError::ChunkRead {
				offset,
				reason: e.to_string(),
			})?;
		file.read_exact(&mut buf)
			.await
			.map_err(|e| ScanError::ChunkRead {
				offset,
				reason: e.to_string(),
			})?;

		Ok(buf)
	}
}

/// An in-memory buffer, used by tests and small inputs.
#[derive(Clone)]
pub struct MemorySource {
	name: String,
	data: Arc<[u8]>,
	last_modified_ms: i64,
}

impl MemorySource {
	pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>, last_modified_ms: i64) -> Self {
		Self {
			name: name.into(),
			data: data.into(),
			last_modified_ms,
		}
	}
}

#[async_trait::async_trait]
impl ScanSource for MemorySource {
	fn name(&self) -> &str {
		&self.name
	}

	fn size(&self) -> u64 {
		self.data.len() as u64
	}

	fn last_modified_ms(&self) -> i64 {
		self.last_modified_ms
	}

	async fn read_range(&self, offset: u64, len: usize) -> Result<Vec<u8>, ScanError> {
		let start = usize::try_from(offset).ok();
		let range = start.and_then(|s| Some(s..s.checked_add(len)?));

		match range.and_then(|r| self.data.get(r)) {
			Some(bytes) => Ok(bytes.to_vec()),
			None => Err(ScanError::ChunkRead {
				offset,
				reason: format!("range of {} bytes is out of bounds", len),
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[tokio::test]
	async fn memory_source_reads_ranges() {
		let source = MemorySource::new("mem.bin", vec![1u8, 2, 3, 4, 5], 42);
		assert_eq!(source.size(), 5);
		assert_eq!(source.read_range(1, 3).await.unwrap(), vec![2, 3, 4]);
		assert!(source.read_range(4, 2).await.is_err());
	}

	#[tokio::test]
	async fn file_source_reads_ranges() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(b"0123456789").unwrap();
		file.flush().unwrap();

		let source = FileSource::open(file.path()).await.unwrap();
		assert_eq!(source.size(), 10);
		assert!(source.last_modified_ms() > 0);
		assert_eq!(source.read_range(3, 4).await.unwrap(), b"3456".to_vec());
		assert!(source.read_range(8, 4).await.is_err());
	}
}

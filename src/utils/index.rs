use std::sync::{Mutex, MutexGuard, PoisonError};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn format_gigabytes(bytes: u64) -> String {
	format!("{:.2} GB", bytes as f64 / BYTES_PER_GIB)
}

pub fn format_percent(progress: f64) -> String {
	format!("{:.2}%", progress)
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
	chrono::Utc::now().timestamp_millis()
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for executed commands.
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
	commands: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	auth_retries: AtomicU64,
}
impl ExecutorMetrics {
	/// Returns the number of `execute` invocations.
	pub fn commands(&self) -> u64 {
		self.commands.load(Ordering::Relaxed)
	}

	/// Returns the number of invocations that produced a result.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of invocations that ended in a terminal failure.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of forced renewal-and-retry cycles.
	pub fn auth_retries(&self) -> u64 {
		self.auth_retries.load(Ordering::Relaxed)
	}

	pub(crate) fn record_command(&self) {
		self.commands.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_auth_retry(&self) {
		self.auth_retries.fetch_add(1, Ordering::Relaxed);
	}
}

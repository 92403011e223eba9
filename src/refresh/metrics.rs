// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh cycles.
///
/// `attempts` counts remote refresh calls; `joins` counts callers that waited on a cycle
/// someone else started instead of issuing their own call.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	joins: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	clear_failure: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refresh cycles that reached the remote endpoint stage.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of callers that joined an in-flight cycle.
	pub fn joins(&self) -> u64 {
		self.joins.load(Ordering::Relaxed)
	}

	/// Returns the number of cycles that produced a new access token.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of cycles that ended the session.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of failed cycles whose store clear itself failed.
	///
	/// A non-zero value means a dead session may still be stored.
	pub fn clear_failures(&self) -> u64 {
		self.clear_failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joins.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_clear_failure(&self) {
		self.clear_failure.fetch_add(1, Ordering::Relaxed);
	}
}

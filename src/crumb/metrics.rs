// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-cache counters describing how callers were served.
///
/// `fetches` counts requests sent to the credential endpoint; every fetch ends in exactly one of
/// `successes`, `failures`, or `abandoned`. `shared` counts callers that queued behind another
/// caller's fetch and took its outcome instead of sending their own.
#[derive(Debug, Default)]
pub struct CrumbMetrics {
	fetches: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	abandoned: AtomicU64,
	shared: AtomicU64,
}
impl CrumbMetrics {
	/// Fetches sent to the credential endpoint.
	pub fn fetches(&self) -> u64 {
		self.fetches.load(Ordering::Relaxed)
	}

	/// Fetches that produced a crumb.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Fetches the endpoint or transport rejected.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Fetches cut short by cancellation or dispatcher shutdown; these leave the cache as is.
	pub fn abandoned(&self) -> u64 {
		self.abandoned.load(Ordering::Relaxed)
	}

	/// Callers served by a fetch some other caller sent.
	pub fn shared(&self) -> u64 {
		self.shared.load(Ordering::Relaxed)
	}

	pub(crate) fn record_fetch(&self) {
		self.fetches.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_abandoned(&self) {
		self.abandoned.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_shared(&self) {
		self.shared.fetch_add(1, Ordering::Relaxed);
	}
}

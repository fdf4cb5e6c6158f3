//! Concurrency- and rate-limiting request dispatcher.
//!
//! [`Dispatcher`] decorates an [`HttpTransport`] and admits each request under two caps at once:
//!
//! - a concurrency slot, held while the request is being forwarded and released as soon as the
//!   transport resolves (success, error, or cancellation);
//! - a rate slot, released by a scheduled task exactly one period after it was acquired,
//!   regardless of how the forwarded call ends.
//!
//! Short bursts can therefore use up to `max_parallel` requests at once while total admissions
//! never exceed `max_per_period` within any trailing window. Cancellation observed while
//! waiting for either slot aborts the call before the transport is touched and before a rate
//! slot is consumed.

pub mod config;

pub use config::*;

// crates.io
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
// self
use crate::{
	_prelude::*,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	obs::{self, Operation, OperationSpan, Outcome},
};

/// Transport decorator enforcing [`DispatchLimits`].
///
/// Clones share the same slot pools. Dropping the last clone cancels every pending rate-slot
/// release timer; [`Dispatcher::shutdown`] does the same explicitly and also wakes waiters.
pub struct Dispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	inner: Arc<T>,
	gate: Option<Arc<Gate>>,
}
impl<T> Dispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	/// Wraps `inner` using the provided throttle mode.
	pub fn new(inner: Arc<T>, throttle: impl Into<Throttle>) -> Self {
		let gate = match throttle.into() {
			Throttle::Disabled => None,
			Throttle::Limited(limits) => Some(Arc::new(Gate::new(limits))),
		};

		Self { inner, gate }
	}

	/// Wraps `inner` without any limiting; requests go straight to the transport.
	pub fn passthrough(inner: Arc<T>) -> Self {
		Self::new(inner, Throttle::Disabled)
	}

	/// Returns the wrapped transport.
	pub fn inner(&self) -> &Arc<T> {
		&self.inner
	}

	/// Returns the active limits, or `None` when throttling is disabled.
	pub fn limits(&self) -> Option<&DispatchLimits> {
		self.gate.as_deref().map(|gate| &gate.limits)
	}

	/// Concurrency slots currently free.
	pub fn available_concurrency(&self) -> Option<usize> {
		self.gate.as_deref().map(|gate| gate.concurrency.available_permits())
	}

	/// Rate slots currently free.
	pub fn available_rate_slots(&self) -> Option<usize> {
		self.gate.as_deref().map(|gate| gate.rate.available_permits())
	}

	/// Number of rate-slot releases still waiting for their period to elapse.
	pub fn pending_releases(&self) -> usize {
		self.gate.as_deref().map_or(0, |gate| gate.releases.len())
	}

	/// Admits `request` under both caps, forwards it, and returns the transport's result
	/// unchanged.
	///
	/// `cancel` is observed at every suspension point. Firing it while waiting for a slot returns
	/// [`Error::Cancelled`] without contacting the transport; firing it while the transport is
	/// working drops the in-flight future and releases the concurrency slot, while the rate slot
	/// runs out its period.
	pub async fn dispatch(
		&self,
		request: HttpRequest,
		cancel: &CancellationToken,
	) -> Result<HttpResponse> {
		const OP: Operation = Operation::Dispatch;

		let span = OperationSpan::new(OP, "dispatch");

		obs::record_outcome(OP, Outcome::Attempt);

		let result = span
			.instrument(async move {
				let _concurrency = match self.gate.as_deref() {
					Some(gate) => Some(gate.admit(cancel).await?),
					None => None,
				};

				tokio::select! {
					biased;
					_ = cancel.cancelled() => Err(Error::Cancelled),
					response = self.inner.send(request) => response,
				}
			})
			.await;

		obs::record_outcome(OP, Outcome::of(&result));

		result
	}

	/// Stops admitting requests and cancels pending rate-slot release timers.
	///
	/// Callers waiting for a slot receive [`Error::Closed`]; requests already forwarded run to
	/// completion. Resolves once every release task has exited.
	pub async fn shutdown(&self) {
		if let Some(gate) = self.gate.as_deref() {
			gate.close();
			gate.releases.wait().await;
		}
	}
}
impl<T> Clone for Dispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone(), gate: self.gate.clone() }
	}
}
impl<T> Debug for Dispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Dispatcher")
			.field("limits", &self.limits())
			.field("available_concurrency", &self.available_concurrency())
			.field("available_rate_slots", &self.available_rate_slots())
			.finish()
	}
}
impl<T> HttpTransport for Dispatcher<T>
where
	T: ?Sized + HttpTransport,
{
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let cancel = CancellationToken::new();

			self.dispatch(request, &cancel).await
		})
	}

	fn reset(&self) -> Result<()> {
		self.inner.reset()
	}
}

struct Gate {
	limits: DispatchLimits,
	concurrency: Arc<Semaphore>,
	rate: Arc<Semaphore>,
	releases: TaskTracker,
	shutdown: CancellationToken,
}
impl Gate {
	fn new(limits: DispatchLimits) -> Self {
		Self {
			limits,
			concurrency: Arc::new(Semaphore::new(limits.max_parallel())),
			rate: Arc::new(Semaphore::new(limits.max_per_period())),
			releases: TaskTracker::new(),
			shutdown: CancellationToken::new(),
		}
	}

	/// Acquires a concurrency slot then a rate slot, scheduling the rate slot's release.
	async fn admit(&self, cancel: &CancellationToken) -> Result<OwnedSemaphorePermit> {
		let concurrency = acquire(&self.concurrency, cancel).await?;
		let rate = acquire(&self.rate, cancel).await?;

		self.schedule_release(rate);

		#[cfg(feature = "tracing")]
		tracing::debug!(
			concurrency_free = self.concurrency.available_permits(),
			rate_free = self.rate.available_permits(),
			"request admitted"
		);

		Ok(concurrency)
	}

	fn schedule_release(&self, permit: OwnedSemaphorePermit) {
		// The deadline is fixed at admission and saturates for periods past the clock's range.
		let elapsed = tokio::time::sleep(self.limits.period());
		let shutdown = self.shutdown.clone();

		self.releases.spawn(async move {
			tokio::select! {
				_ = elapsed => {},
				_ = shutdown.cancelled() => {},
			}

			drop(permit);
		});
	}

	fn close(&self) {
		self.shutdown.cancel();
		self.concurrency.close();
		self.rate.close();
		self.releases.close();
	}
}
impl Drop for Gate {
	fn drop(&mut self) {
		self.close();
	}
}

async fn acquire(
	pool: &Arc<Semaphore>,
	cancel: &CancellationToken,
) -> Result<OwnedSemaphorePermit> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(Error::Cancelled),
		permit = pool.clone().acquire_owned() => permit.map_err(|_| Error::Closed),
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;
	use crate::_preludet::CountingTransport;

	fn request() -> HttpRequest {
		HttpRequest::new(Vec::new())
	}

	#[tokio::test(start_paused = true)]
	async fn pre_cancelled_dispatch_never_touches_transport() {
		let transport = Arc::new(CountingTransport::ok("body"));
		let dispatcher = Dispatcher::new(
			transport.clone(),
			Throttle::limited(2, StdDuration::from_secs(1), 1)
				.expect("Throttle should build for cancellation test."),
		);
		let cancel = CancellationToken::new();

		cancel.cancel();

		let err = dispatcher
			.dispatch(request(), &cancel)
			.await
			.expect_err("Cancelled dispatch should fail.");

		assert!(err.is_cancelled());
		assert_eq!(transport.calls(), 0);
		assert_eq!(dispatcher.available_concurrency(), Some(1));
		assert_eq!(dispatcher.available_rate_slots(), Some(2));
		assert_eq!(dispatcher.pending_releases(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn rate_slot_outlives_the_call_by_one_period() {
		let transport = Arc::new(CountingTransport::ok("body"));
		let dispatcher = Dispatcher::new(
			transport.clone(),
			Throttle::limited(1, StdDuration::from_secs(10), 1)
				.expect("Throttle should build for release test."),
		);
		let cancel = CancellationToken::new();

		dispatcher.dispatch(request(), &cancel).await.expect("First dispatch should succeed.");

		assert_eq!(dispatcher.available_concurrency(), Some(1));
		assert_eq!(dispatcher.available_rate_slots(), Some(0));
		assert_eq!(dispatcher.pending_releases(), 1);

		tokio::time::sleep(StdDuration::from_millis(10_001)).await;
		tokio::task::yield_now().await;

		assert_eq!(dispatcher.available_rate_slots(), Some(1));
		assert_eq!(dispatcher.pending_releases(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn unbounded_period_holds_the_rate_slot_without_overflowing() {
		let transport = Arc::new(CountingTransport::ok("body"));
		let dispatcher = Dispatcher::new(
			transport.clone(),
			Throttle::limited(1, StdDuration::MAX, 1)
				.expect("Throttle should accept the largest representable period."),
		);
		let cancel = CancellationToken::new();
		let response = dispatcher
			.dispatch(request(), &cancel)
			.await
			.expect("Dispatch with an unbounded period should succeed.");

		assert_eq!(response.body().as_slice(), b"body");
		assert_eq!(dispatcher.available_rate_slots(), Some(0));
		assert_eq!(dispatcher.pending_releases(), 1);

		tokio::time::sleep(StdDuration::from_secs(365 * 24 * 60 * 60)).await;

		assert_eq!(dispatcher.available_rate_slots(), Some(0));

		dispatcher.shutdown().await;

		assert_eq!(dispatcher.pending_releases(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn shutdown_releases_timers_and_rejects_new_requests() {
		let transport = Arc::new(CountingTransport::ok("body"));
		let dispatcher = Dispatcher::new(
			transport.clone(),
			Throttle::limited(3, StdDuration::from_secs(60), -1)
				.expect("Throttle should build for shutdown test."),
		);
		let cancel = CancellationToken::new();

		dispatcher.dispatch(request(), &cancel).await.expect("Dispatch should succeed.");
		dispatcher.shutdown().await;

		assert_eq!(dispatcher.pending_releases(), 0);

		let err = dispatcher
			.dispatch(request(), &cancel)
			.await
			.expect_err("Dispatch after shutdown should fail.");

		assert!(matches!(err, Error::Closed));
		assert_eq!(transport.calls(), 1);
	}

	#[tokio::test]
	async fn passthrough_forwards_without_slots() {
		let transport = Arc::new(CountingTransport::ok("body"));
		let dispatcher = Dispatcher::passthrough(transport.clone());
		let response = dispatcher
			.dispatch(request(), &CancellationToken::new())
			.await
			.expect("Passthrough dispatch should succeed.");

		assert_eq!(response.body().as_slice(), b"body");
		assert_eq!(dispatcher.limits(), None);
		assert_eq!(dispatcher.available_concurrency(), None);
		assert_eq!(transport.calls(), 1);
	}
}

//! Shared crumb cache with single-flight fetches.
//!
//! [`CrumbCache::get_token`] returns the cached crumb when one is present and otherwise fetches
//! a fresh one from the credential-issuing endpoint through the same [`Dispatcher`] every other
//! call uses, so the fetch counts against the upstream quota. Concurrent callers that find the
//! cache empty queue behind a single fetch gate and reuse whatever the first fetch stored
//! instead of stampeding the endpoint.
//!
//! The cache moves through `Empty -> Fetching -> Valid`. A failed fetch leaves it `Empty`; the
//! callers queued behind it share the failure and the next call retries from scratch. A
//! cancelled fetch changes nothing. [`CrumbCache::reset`] bumps a generation counter; a fetch
//! that started under an older generation never writes its result back.

pub mod endpoint;
pub mod secret;

mod metrics;

pub use endpoint::*;
pub use metrics::*;
pub use secret::*;

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	dispatch::Dispatcher,
	error::FetchFailure,
	http::HttpTransport,
	obs::{self, Operation, OperationSpan, Outcome},
};

/// Explicitly owned crumb cache.
///
/// Share it behind an [`Arc`] with every component that stamps crumbs on requests.
pub struct CrumbCache<T>
where
	T: ?Sized + HttpTransport,
{
	dispatcher: Dispatcher<T>,
	endpoint: CrumbEndpoint,
	state: Mutex<CacheState>,
	fetch_gate: AsyncMutex<()>,
	metrics: Arc<CrumbMetrics>,
}
impl<T> CrumbCache<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates an empty cache that fetches from `endpoint` through `dispatcher`.
	pub fn new(dispatcher: Dispatcher<T>, endpoint: CrumbEndpoint) -> Self {
		Self {
			dispatcher,
			endpoint,
			state: Default::default(),
			fetch_gate: AsyncMutex::new(()),
			metrics: Default::default(),
		}
	}

	/// Endpoint the cache fetches from.
	pub fn endpoint(&self) -> &CrumbEndpoint {
		&self.endpoint
	}

	/// Fetch counters for this cache.
	pub fn metrics(&self) -> &Arc<CrumbMetrics> {
		&self.metrics
	}

	/// Returns the cached crumb without fetching.
	pub fn peek(&self) -> Option<Crumb> {
		self.state.lock().crumb.clone()
	}

	/// Returns a crumb, fetching one when the cache is empty or `force_refresh` is set.
	///
	/// Callers that queue behind a fetch in flight take that fetch's outcome when it settles,
	/// whether a crumb or a fetch failure, instead of sending their own; this includes a forced
	/// refresh queued behind another refresh. A caller arriving after the outcome settled starts
	/// afresh, so a failure is retried by the next call. Cancellation is observed while waiting
	/// for the fetch gate and throughout the fetch itself, and a cancelled fetch leaves the cache
	/// exactly as it found it.
	pub async fn get_token(
		&self,
		force_refresh: bool,
		cancel: &CancellationToken,
	) -> Result<Crumb> {
		let observed = {
			let state = self.state.lock();

			if let Some(crumb) = state.crumb.as_ref().filter(|_| !force_refresh) {
				return Ok(crumb.clone());
			}

			state.generation
		};
		let span = OperationSpan::new(Operation::CrumbFetch, "get_token");

		span.instrument(async move {
			let _singleflight = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled),
				guard = self.fetch_gate.lock() => guard,
			};
			let generation = {
				let state = self.state.lock();
				let settled_meanwhile = state.generation != observed;

				if let Some(crumb) =
					state.crumb.as_ref().filter(|_| !force_refresh || settled_meanwhile)
				{
					if settled_meanwhile {
						self.metrics.record_shared();
					}

					return Ok(crumb.clone());
				}
				if let Some(failure) = state.failure.filter(|_| settled_meanwhile) {
					self.metrics.record_shared();

					return Err(Error::fetch(failure));
				}

				state.generation
			};
			let result = self.fetch(cancel).await;
			let mut state = self.state.lock();
			let current = state.generation == generation;

			match result {
				Ok(crumb) if current => {
					state.crumb = Some(crumb.clone());
					state.failure = None;
					state.generation += 1;

					#[cfg(feature = "tracing")]
					tracing::debug!(generation = state.generation, "crumb cached");

					Ok(crumb)
				},
				Ok(_) => Err(Error::Superseded),
				Err(Error::CredentialFetch { failure, source }) if current => {
					state.crumb = None;
					state.failure = Some(failure);
					state.generation += 1;

					Err(Error::CredentialFetch { failure, source })
				},
				// Cancellation, shutdown, and local errors say nothing about the endpoint.
				Err(e) => Err(e),
			}
		})
		.await
	}

	/// Clears the cached crumb and discards the transport's cached client state.
	///
	/// The next [`get_token`](Self::get_token) fetches from a clean state. A fetch already in
	/// flight finishes with [`Error::Superseded`] and its crumb is dropped.
	pub fn reset(&self) -> Result<()> {
		{
			let mut state = self.state.lock();

			state.crumb = None;
			state.failure = None;
			state.generation += 1;
		}

		#[cfg(feature = "tracing")]
		tracing::debug!("crumb cache reset");

		self.dispatcher.reset()
	}

	async fn fetch(&self, cancel: &CancellationToken) -> Result<Crumb> {
		const OP: Operation = Operation::CrumbFetch;

		obs::record_outcome(OP, Outcome::Attempt);
		self.metrics.record_fetch();

		let result = self.fetch_once(cancel).await;

		match &result {
			Ok(_) => self.metrics.record_success(),
			Err(Error::Cancelled | Error::Closed) => {
				self.metrics.record_abandoned();

				#[cfg(feature = "tracing")]
				tracing::debug!("crumb fetch abandoned");
			},
			Err(_e) => {
				self.metrics.record_failure();

				#[cfg(feature = "tracing")]
				tracing::warn!(error = %_e, "crumb fetch failed");
			},
		}

		obs::record_outcome(OP, Outcome::of(&result));

		result
	}

	async fn fetch_once(&self, cancel: &CancellationToken) -> Result<Crumb> {
		let request = self.endpoint.request()?;
		let response = match self.dispatcher.dispatch(request, cancel).await {
			Ok(response) => response,
			Err(e @ (Error::Cancelled | Error::Closed)) => return Err(e),
			Err(e) =>
				return Err(Error::CredentialFetch {
					failure: FetchFailure::Transport,
					source: Some(Box::new(e)),
				}),
		};
		let status = response.status();

		if !status.is_success() {
			return Err(Error::fetch(FetchFailure::Status(status.as_u16())));
		}

		let body = response.into_body();

		if body.is_empty() {
			return Err(Error::fetch(FetchFailure::EmptyBody));
		}

		Ok(Crumb::new(String::from_utf8_lossy(&body).into_owned()))
	}
}
impl<T> Debug for CrumbCache<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CrumbCache")
			.field("endpoint", &self.endpoint)
			.field("cached", &self.state.lock().crumb.is_some())
			.finish()
	}
}

#[derive(Debug, Default)]
struct CacheState {
	crumb: Option<Crumb>,
	// Outcome of the last settled fetch when it failed; handed to callers that queued behind it.
	failure: Option<FetchFailure>,
	// Bumped whenever a fetch settles or the cache is reset.
	generation: u64,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::CountingTransport;

	fn cache(transport: Arc<CountingTransport>) -> CrumbCache<CountingTransport> {
		let endpoint = CrumbEndpoint::parse("https://example.com/getcrumb")
			.expect("Crumb endpoint should parse for cache tests.");

		CrumbCache::new(Dispatcher::passthrough(transport), endpoint)
	}

	#[tokio::test]
	async fn forced_refresh_overwrites_cached_crumb() {
		let transport = Arc::new(CountingTransport::ok("first"));
		let cache = cache(transport.clone());
		let cancel = CancellationToken::new();
		let first = cache.get_token(false, &cancel).await.expect("First fetch should succeed.");

		transport.respond_with(200, "second");

		let forced = cache.get_token(true, &cancel).await.expect("Forced fetch should succeed.");

		assert_eq!(first.expose(), "first");
		assert_eq!(forced.expose(), "second");
		assert_eq!(cache.peek().map(|crumb| crumb.expose().to_owned()), Some("second".into()));
		assert_eq!(transport.calls(), 2);
		assert_eq!(cache.metrics().fetches(), 2);
	}

	#[tokio::test]
	async fn failed_forced_refresh_empties_the_cache() {
		let transport = Arc::new(CountingTransport::ok("first"));
		let cache = cache(transport.clone());
		let cancel = CancellationToken::new();

		cache.get_token(false, &cancel).await.expect("First fetch should succeed.");
		transport.respond_with(503, "");

		let err = cache.get_token(true, &cancel).await.expect_err("Forced fetch should fail.");

		assert!(matches!(
			err,
			Error::CredentialFetch { failure: FetchFailure::Status(503), .. }
		));
		assert!(cache.peek().is_none());
		assert_eq!(cache.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn transport_errors_become_fetch_failures() {
		let transport = Arc::new(CountingTransport::failing());
		let cache = cache(transport.clone());
		let err = cache
			.get_token(false, &CancellationToken::new())
			.await
			.expect_err("Transport failure should surface.");

		assert!(matches!(err, Error::CredentialFetch { failure: FetchFailure::Transport, .. }));
		assert!(std::error::Error::source(&err).is_some());
	}

	#[tokio::test]
	async fn cancelled_wait_leaves_cache_empty() {
		let transport = Arc::new(CountingTransport::ok("value"));
		let cache = cache(transport.clone());
		let cancel = CancellationToken::new();

		cancel.cancel();

		let err = cache.get_token(false, &cancel).await.expect_err("Cancelled call should fail.");

		assert!(err.is_cancelled());
		assert!(cache.peek().is_none());
		assert_eq!(transport.calls(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn queued_callers_share_a_failed_fetch() {
		let transport = Arc::new(
			CountingTransport::ok("unused").with_latency(std::time::Duration::from_millis(50)),
		);
		let cache = cache(transport.clone());
		let cancel = CancellationToken::new();

		transport.respond_with(404, "");

		let results = tokio::join!(
			cache.get_token(false, &cancel),
			cache.get_token(false, &cancel),
			cache.get_token(false, &cancel),
			cache.get_token(false, &cancel),
			cache.get_token(true, &cancel),
		);

		for result in [results.0, results.1, results.2, results.3, results.4] {
			let err = result.expect_err("Every queued caller should observe the failure.");

			assert!(matches!(
				err,
				Error::CredentialFetch { failure: FetchFailure::Status(404), .. }
			));
		}

		assert_eq!(transport.calls(), 1);
		assert_eq!(cache.metrics().fetches(), 1);
		assert_eq!(cache.metrics().failures(), 1);
		assert_eq!(cache.metrics().shared(), 4);
		assert!(cache.peek().is_none());

		transport.respond_with(200, "recovered");

		let crumb = cache.get_token(false, &cancel).await.expect("A later call should retry.");

		assert_eq!(crumb.expose(), "recovered");
		assert_eq!(transport.calls(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn cancelled_forced_refresh_keeps_the_cached_crumb() {
		let transport = Arc::new(
			CountingTransport::ok("good").with_latency(std::time::Duration::from_secs(1)),
		);
		let cache = Arc::new(cache(transport.clone()));

		cache
			.get_token(false, &CancellationToken::new())
			.await
			.expect("Initial fetch should succeed.");

		let cancel = CancellationToken::new();
		let refresh = {
			let cache = cache.clone();
			let cancel = cancel.clone();

			tokio::spawn(async move { cache.get_token(true, &cancel).await })
		};

		tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		cancel.cancel();

		let err = refresh
			.await
			.expect("Refresh task should not panic.")
			.expect_err("Cancelled refresh should fail.");

		assert!(err.is_cancelled());
		assert_eq!(cache.peek().map(|crumb| crumb.expose().to_owned()), Some("good".into()));
		assert_eq!(cache.metrics().abandoned(), 1);
		assert_eq!(cache.metrics().failures(), 0);

		let crumb = cache
			.get_token(false, &CancellationToken::new())
			.await
			.expect("Cached read should succeed.");

		assert_eq!(crumb.expose(), "good");
		assert_eq!(transport.calls(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn reset_discards_in_flight_fetch() {
		let transport = Arc::new(
			CountingTransport::ok("stale").with_latency(std::time::Duration::from_secs(1)),
		);
		let cache = Arc::new(cache(transport.clone()));
		let fetcher = {
			let cache = cache.clone();

			tokio::spawn(async move { cache.get_token(false, &CancellationToken::new()).await })
		};

		tokio::time::sleep(std::time::Duration::from_millis(10)).await;
		cache.reset().expect("Reset should succeed.");

		let err = fetcher
			.await
			.expect("Fetch task should not panic.")
			.expect_err("Fetch overtaken by reset should be superseded.");

		assert!(matches!(err, Error::Superseded));
		assert!(cache.peek().is_none());
		assert_eq!(transport.resets(), 1);
	}
}

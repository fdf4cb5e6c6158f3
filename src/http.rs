//! Transport primitives for outbound API calls.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. The
//! [`Dispatcher`](crate::dispatch::Dispatcher) decorates any implementation without changing
//! its contract, so transports compose (logging, retry, throttling) by wrapping rather than
//! by inheritance. Requests and responses use the [`http`] crate's types with owned bodies.

// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Outbound request with an owned byte body.
pub type HttpRequest = http::Request<Vec<u8>>;
/// Inbound response with an owned byte body.
pub type HttpResponse = http::Response<Vec<u8>>;

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + 'a + Send>>;

/// Generic request-sending capability.
///
/// Implementations must be `Send + Sync + 'static` so they can sit behind an [`Arc`] shared by
/// the dispatcher, the crumb cache, and every call site. Errors are surfaced as crate
/// [`Error`] values; a transport never interprets the response status itself.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves to the upstream response.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;

	/// Discards any cached client state (cookies, connection pools, sessions).
	///
	/// Called when the crumb cache is reset so the next fetch starts from a clean state.
	fn reset(&self) -> Result<()> {
		Ok(())
	}
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		T::send(self, request)
	}

	fn reset(&self) -> Result<()> {
		T::reset(self)
	}
}

#[cfg(feature = "reqwest")]
type ClientFactory = Arc<dyn Fn() -> Result<ReqwestClient, ReqwestError> + Send + Sync>;

/// Cookie-aware reqwest transport.
///
/// Credential endpoints commonly mint the crumb against a session cookie, so the default
/// client keeps a cookie store. [`HttpTransport::reset`] rebuilds the client from its factory,
/// dropping every cookie and pooled connection.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestHttpClient {
	client: Arc<RwLock<ReqwestClient>>,
	factory: ClientFactory,
}
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// User agent applied by [`ReqwestHttpClient::new`].
	pub const DEFAULT_USER_AGENT: &'static str =
		concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

	/// Builds a cookie-aware client with the default user agent.
	pub fn new() -> Result<Self> {
		Self::with_factory(|| {
			ReqwestClient::builder()
				.cookie_store(true)
				.user_agent(Self::DEFAULT_USER_AGENT)
				.build()
		})
	}

	/// Builds a transport whose client (and every rebuilt client) comes from `factory`.
	pub fn with_factory<F>(factory: F) -> Result<Self>
	where
		F: 'static + Fn() -> Result<ReqwestClient, ReqwestError> + Send + Sync,
	{
		let client = factory().map_err(ConfigError::from)?;

		Ok(Self { client: Arc::new(RwLock::new(client)), factory: Arc::new(factory) })
	}

	/// Returns a handle to the client currently in use.
	pub fn client(&self) -> ReqwestClient {
		self.client.read().clone()
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let client = self.client();

		Box::pin(async move {
			let request = reqwest::Request::try_from(request).map_err(TransportError::from)?;
			let response = client.execute(request).await.map_err(TransportError::from)?;
			let status = response.status();
			let version = response.version();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();
			let mut response_new = HttpResponse::new(body);

			*response_new.status_mut() = status;
			*response_new.version_mut() = version;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}

	fn reset(&self) -> Result<()> {
		let client = (self.factory)().map_err(ConfigError::from)?;

		*self.client.write() = client;

		Ok(())
	}
}
#[cfg(feature = "reqwest")]
impl Debug for ReqwestHttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ReqwestHttpClient(..)")
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[test]
	fn reset_rebuilds_client_from_factory() {
		let builds = Arc::new(AtomicUsize::new(0));
		let counter = builds.clone();
		let transport = ReqwestHttpClient::with_factory(move || {
			counter.fetch_add(1, Ordering::SeqCst);

			ReqwestClient::builder().cookie_store(true).build()
		})
		.expect("Reqwest client should build for reset test.");

		assert_eq!(builds.load(Ordering::SeqCst), 1);

		transport.reset().expect("Reset should rebuild the reqwest client.");

		assert_eq!(builds.load(Ordering::SeqCst), 2);
	}
}

//! Explicitly owned bundle of the dispatcher and crumb cache used by call sites.

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	crumb::{Crumb, CrumbCache, CrumbEndpoint},
	dispatch::{Dispatcher, Throttle},
	ext::{CrumbSigner, QueryCrumbSigner},
	http::{HttpRequest, HttpResponse, HttpTransport},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = Gateway<ReqwestHttpClient>;

/// Outbound-traffic entry point for call sites.
///
/// The gateway owns one [`Dispatcher`] and one [`CrumbCache`] that fetches through it, so crumb
/// fetches and data requests draw from the same slot pools. Clones share both.
pub struct Gateway<T>
where
	T: ?Sized + HttpTransport,
{
	/// Dispatcher every outbound request goes through.
	pub dispatcher: Dispatcher<T>,
	/// Crumb cache backed by the same dispatcher.
	pub crumbs: Arc<CrumbCache<T>>,
	/// Signer used by [`Gateway::send_signed`].
	pub signer: Arc<dyn CrumbSigner>,
}
impl<T> Gateway<T>
where
	T: ?Sized + HttpTransport,
{
	/// Wraps `transport` with `throttle` and fetches crumbs from `endpoint`.
	pub fn new(
		transport: Arc<T>,
		throttle: impl Into<Throttle>,
		endpoint: CrumbEndpoint,
	) -> Self {
		let dispatcher = Dispatcher::new(transport, throttle);
		let crumbs = Arc::new(CrumbCache::new(dispatcher.clone(), endpoint));

		Self { dispatcher, crumbs, signer: Arc::new(QueryCrumbSigner::default()) }
	}

	/// Replaces the signer used by [`Gateway::send_signed`].
	pub fn with_signer(mut self, signer: impl 'static + CrumbSigner) -> Self {
		self.signer = Arc::new(signer);

		self
	}

	/// See [`Dispatcher::dispatch`].
	pub async fn dispatch(
		&self,
		request: HttpRequest,
		cancel: &CancellationToken,
	) -> Result<HttpResponse> {
		self.dispatcher.dispatch(request, cancel).await
	}

	/// See [`CrumbCache::get_token`].
	pub async fn get_token(
		&self,
		force_refresh: bool,
		cancel: &CancellationToken,
	) -> Result<Crumb> {
		self.crumbs.get_token(force_refresh, cancel).await
	}

	/// See [`CrumbCache::reset`].
	pub fn reset(&self) -> Result<()> {
		self.crumbs.reset()
	}

	/// Obtains a crumb, attaches it to `request`, and dispatches the signed request.
	///
	/// The response is returned as-is; interpreting its status and body (including detecting a
	/// crumb the upstream no longer accepts) is the call site's concern.
	pub async fn send_signed(
		&self,
		request: HttpRequest,
		cancel: &CancellationToken,
	) -> Result<HttpResponse> {
		let crumb = self.crumbs.get_token(false, cancel).await?;
		let request = self.signer.attach_crumb(request, &crumb)?;

		self.dispatcher.dispatch(request, cancel).await
	}

	/// See [`Dispatcher::shutdown`].
	pub async fn shutdown(&self) {
		self.dispatcher.shutdown().await;
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestHttpClient> {
	/// Creates a gateway over a fresh cookie-aware [`ReqwestHttpClient`].
	pub fn reqwest(throttle: impl Into<Throttle>, endpoint: CrumbEndpoint) -> Result<Self> {
		Ok(Self::new(Arc::new(ReqwestHttpClient::new()?), throttle, endpoint))
	}
}
impl<T> Clone for Gateway<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			dispatcher: self.dispatcher.clone(),
			crumbs: self.crumbs.clone(),
			signer: self.signer.clone(),
		}
	}
}
impl<T> Debug for Gateway<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("dispatcher", &self.dispatcher)
			.field("crumbs", &self.crumbs)
			.finish()
	}
}

//! Outbound-traffic governance for quota-bound HTTP APIs.
//!
//! Two pieces sit between call sites and the network:
//!
//! - [`dispatch::Dispatcher`] admits requests under a concurrency cap and a rolling-window rate
//!   cap, decorating any [`http::HttpTransport`] without changing its contract.
//! - [`crumb::CrumbCache`] holds the shared crumb every protected request carries, fetching it
//!   once through the dispatcher and sharing the result with concurrent callers.
//!
//! [`gateway::Gateway`] bundles both for call sites that want one handle.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod crumb;
pub mod dispatch;
pub mod error;
pub mod ext;
pub mod gateway;
pub mod http;
pub mod obs;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		sync::atomic::{AtomicUsize, Ordering},
		time::Duration as StdDuration,
	};
	// crates.io
	use tokio::time::Instant;
	// self
	use crate::{
		error::{ConfigError, TransportError},
		http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	};

	#[derive(Clone, Debug)]
	enum Reply {
		Respond { status: u16, body: String },
		Fail,
	}

	/// Scripted transport that records every call it receives.
	///
	/// Tracks the number of calls, the peak number of calls in flight at once, the instant and
	/// URI of each call, and how often [`HttpTransport::reset`] was invoked.
	#[derive(Debug)]
	pub struct CountingTransport {
		reply: Mutex<Reply>,
		latency: StdDuration,
		calls: AtomicUsize,
		in_flight: AtomicUsize,
		peak_in_flight: AtomicUsize,
		resets: AtomicUsize,
		log: Mutex<Vec<(Instant, String)>>,
	}
	impl CountingTransport {
		/// Responds `200 OK` with `body` to every call.
		pub fn ok(body: &str) -> Self {
			Self::with_reply(Reply::Respond { status: 200, body: body.into() })
		}

		/// Fails every call with a transport error.
		pub fn failing() -> Self {
			Self::with_reply(Reply::Fail)
		}

		fn with_reply(reply: Reply) -> Self {
			Self {
				reply: Mutex::new(reply),
				latency: StdDuration::ZERO,
				calls: AtomicUsize::new(0),
				in_flight: AtomicUsize::new(0),
				peak_in_flight: AtomicUsize::new(0),
				resets: AtomicUsize::new(0),
				log: Default::default(),
			}
		}

		/// Delays every response by `latency`.
		pub fn with_latency(mut self, latency: StdDuration) -> Self {
			self.latency = latency;

			self
		}

		/// Changes the response returned by subsequent calls.
		pub fn respond_with(&self, status: u16, body: &str) {
			*self.reply.lock() = Reply::Respond { status, body: body.into() };
		}

		/// Number of calls received.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		/// Highest number of calls observed in flight at once.
		pub fn peak_in_flight(&self) -> usize {
			self.peak_in_flight.load(Ordering::SeqCst)
		}

		/// Number of [`HttpTransport::reset`] invocations.
		pub fn resets(&self) -> usize {
			self.resets.load(Ordering::SeqCst)
		}

		/// Instants at which calls started, in arrival order.
		pub fn started_at(&self) -> Vec<Instant> {
			self.log.lock().iter().map(|(at, _)| *at).collect()
		}

		/// Request URIs, in arrival order.
		pub fn uris(&self) -> Vec<String> {
			self.log.lock().iter().map(|(_, uri)| uri.clone()).collect()
		}
	}
	impl HttpTransport for CountingTransport {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				self.calls.fetch_add(1, Ordering::SeqCst);
				self.log.lock().push((Instant::now(), request.uri().to_string()));

				let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
				let _in_flight = InFlight(&self.in_flight);

				self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

				if !self.latency.is_zero() {
					tokio::time::sleep(self.latency).await;
				}

				let reply = self.reply.lock().clone();

				match reply {
					Reply::Respond { status, body } => {
						let response = http::Response::builder()
							.status(status)
							.body(body.into_bytes())
							.map_err(ConfigError::from)?;

						Ok::<HttpResponse, Error>(response)
					},
					Reply::Fail => Err(TransportError::Io(std::io::Error::other(
						"connection refused",
					))
					.into()),
				}
			})
		}

		fn reset(&self) -> Result<()> {
			self.resets.fetch_add(1, Ordering::SeqCst);

			Ok(())
		}
	}

	struct InFlight<'a>(&'a AtomicUsize);
	impl Drop for InFlight<'_> {
		fn drop(&mut self) {
			self.0.fetch_sub(1, Ordering::SeqCst);
		}
	}
}

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use httpmock as _;

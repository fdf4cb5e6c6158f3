//! Crate-level error types shared by the dispatcher, the crumb cache, and transports.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error carried verbatim from transports and other collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure, passed through unchanged.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The credential-issuing endpoint did not yield a usable crumb.
	#[error("Credential fetch failed: {failure}.")]
	CredentialFetch {
		/// What went wrong with the fetch.
		failure: FetchFailure,
		/// Underlying failure, when the fetch never produced a response.
		#[source]
		source: Option<BoxError>,
	},

	/// The caller's cancellation token fired before the call completed.
	#[error("Call was cancelled.")]
	Cancelled,
	/// The dispatcher was shut down while the call waited for a slot.
	#[error("Dispatcher has been shut down.")]
	Closed,
	/// The crumb cache was reset while this call's fetch was in flight.
	#[error("Crumb cache was reset while the fetch was in flight.")]
	Superseded,
}
impl Error {
	/// Returns `true` when the error represents a cancellation outcome.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}

	pub(crate) fn fetch(failure: FetchFailure) -> Self {
		Self::CredentialFetch { failure, source: None }
	}
}

/// Reason a crumb fetch was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchFailure {
	/// The endpoint answered with a non-success status.
	Status(u16),
	/// The endpoint answered with success but an empty body.
	EmptyBody,
	/// The request never produced a response.
	Transport,
}
impl Display for FetchFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Status(status) => write!(f, "endpoint returned HTTP {status}"),
			Self::EmptyBody => f.write_str("endpoint returned an empty body"),
			Self::Transport => f.write_str("transport error"),
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] http::Error),
	/// A URL (endpoint or request target) cannot be parsed.
	#[error("URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Throttle settings could not be deserialized.
	#[error("Throttle settings are invalid.")]
	InvalidSettings {
		/// Path-aware parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},

	/// `max_per_period` must admit at least one request.
	#[error("The max_per_period value must be positive.")]
	ZeroMaxPerPeriod,
	/// `period` must be a positive duration.
	#[error("The period must be positive.")]
	ZeroPeriod,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

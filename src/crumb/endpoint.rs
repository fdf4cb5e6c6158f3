//! The fixed request sent to the credential-issuing endpoint.

// self
use crate::{_prelude::*, error::ConfigError, http::HttpRequest};

/// Credential-issuing endpoint whose successful response body is the raw crumb.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrumbEndpoint {
	url: Url,
}
impl CrumbEndpoint {
	/// Wraps an already-parsed endpoint URL.
	pub fn new(url: Url) -> Self {
		Self { url }
	}

	/// Parses the endpoint URL.
	pub fn parse(raw: &str) -> Result<Self, ConfigError> {
		Url::parse(raw).map(Self::new).map_err(|source| ConfigError::InvalidUrl { source })
	}

	/// Endpoint URL.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Builds the `GET` request for a fresh fetch.
	pub fn request(&self) -> Result<HttpRequest, ConfigError> {
		let request = http::Request::builder()
			.method(http::Method::GET)
			.uri(self.url.as_str())
			.body(Vec::new())?;

		Ok(request)
	}
}

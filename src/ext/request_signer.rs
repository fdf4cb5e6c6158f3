//! Request signing contracts that stamp cached crumbs on outbound requests.

// std
use std::borrow::Cow;
// self
use crate::{_prelude::*, crumb::Crumb, error::ConfigError, http::HttpRequest};

/// Describes how to attach a [`Crumb`] to an outbound request.
///
/// Call sites own the request shape; the signer only injects the credential so the same
/// crumb can be applied consistently across every protected endpoint.
pub trait CrumbSigner
where
	Self: Send + Sync,
{
	/// Consumes the provided request and returns it with `crumb` attached.
	fn attach_crumb(&self, request: HttpRequest, crumb: &Crumb) -> Result<HttpRequest>;
}

/// Appends the crumb as a query parameter (`crumb=<value>` by default).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryCrumbSigner {
	param: Cow<'static, str>,
}
impl QueryCrumbSigner {
	/// Query parameter used by [`QueryCrumbSigner::default`].
	pub const DEFAULT_PARAM: &'static str = "crumb";

	/// Uses `param` as the query parameter name.
	pub fn new(param: impl Into<Cow<'static, str>>) -> Self {
		Self { param: param.into() }
	}

	/// Query parameter name.
	pub fn param(&self) -> &str {
		&self.param
	}
}
impl Default for QueryCrumbSigner {
	fn default() -> Self {
		Self::new(Self::DEFAULT_PARAM)
	}
}
impl CrumbSigner for QueryCrumbSigner {
	fn attach_crumb(&self, mut request: HttpRequest, crumb: &Crumb) -> Result<HttpRequest> {
		let mut url = Url::parse(&request.uri().to_string())
			.map_err(|source| ConfigError::InvalidUrl { source })?;

		url.query_pairs_mut().append_pair(&self.param, crumb.expose());

		let uri = http::Uri::try_from(url.as_str())
			.map_err(http::Error::from)
			.map_err(ConfigError::from)?;

		*request.uri_mut() = uri;

		Ok(request)
	}
}

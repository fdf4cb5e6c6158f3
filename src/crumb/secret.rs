//! Credential wrapper that redacts its value in logs.

// self
use crate::_prelude::*;

/// Opaque crumb stamped on protected outbound requests.
///
/// The cache only ever stores non-empty crumbs; an empty cache is represented by the absence
/// of a value rather than by an empty string.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crumb(String);
impl Crumb {
	/// Wraps a crumb string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner crumb value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the crumb carries a value.
	pub fn is_valid(&self) -> bool {
		!self.0.is_empty()
	}
}
impl AsRef<str> for Crumb {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for Crumb {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("Crumb").field(&"<redacted>").finish()
	}
}
impl Display for Crumb {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

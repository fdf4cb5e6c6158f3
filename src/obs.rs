//! Optional observability helpers for dispatches and crumb fetches.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `quota_broker.operation` with the
//!   `operation` and `stage` (call site) fields, plus debug events on admission, release, and
//!   cache transitions.
//! - Enable `metrics` to increment the `quota_broker_operation_total` counter for every
//!   attempt/success/failure/cancellation, labeled by `operation` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// A request admitted through the dispatcher.
	Dispatch,
	/// A fetch against the credential-issuing endpoint.
	CrumbFetch,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::Dispatch => "dispatch",
			Operation::CrumbFetch => "crumb_fetch",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// The caller's cancellation token fired.
	Cancelled,
}
impl Outcome {
	/// Classifies a finished operation.
	pub fn of<T>(result: &Result<T>) -> Self {
		match result {
			Ok(_) => Self::Success,
			Err(e) if e.is_cancelled() => Self::Cancelled,
			Err(_) => Self::Failure,
		}
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Success => "success",
			Outcome::Failure => "failure",
			Outcome::Cancelled => "cancelled",
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

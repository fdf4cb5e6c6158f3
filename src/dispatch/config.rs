//! Dispatcher limits and the host-facing throttle settings they are built from.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, error::ConfigError};

/// Validated admission limits for a single [`Dispatcher`](crate::dispatch::Dispatcher).
///
/// `max_parallel` is clamped on construction: a negative value, or one greater than
/// `max_per_period`, is silently replaced by `max_per_period`. A cap equal to
/// `max_per_period` adds no limiting beyond the period cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchLimits {
	max_per_period: usize,
	period: StdDuration,
	max_parallel: usize,
}
impl DispatchLimits {
	/// Builds limits admitting at most `max_per_period` requests per trailing `period`, with at
	/// most `max_parallel` in flight.
	pub fn new(
		max_per_period: u32,
		period: StdDuration,
		max_parallel: i64,
	) -> Result<Self, ConfigError> {
		if max_per_period == 0 {
			return Err(ConfigError::ZeroMaxPerPeriod);
		}
		if period.is_zero() {
			return Err(ConfigError::ZeroPeriod);
		}

		let max_per_period = max_per_period as usize;
		let max_parallel = match usize::try_from(max_parallel) {
			Ok(value) if value <= max_per_period => value,
			_ => max_per_period,
		};

		Ok(Self { max_per_period, period, max_parallel })
	}

	/// Maximum admissions within any trailing window of [`period`](Self::period).
	pub fn max_per_period(&self) -> usize {
		self.max_per_period
	}

	/// Length of the rolling window.
	pub fn period(&self) -> StdDuration {
		self.period
	}

	/// Effective (clamped) concurrency cap.
	pub fn max_parallel(&self) -> usize {
		self.max_parallel
	}
}

/// Dispatcher mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Throttle {
	/// Requests go straight to the transport with no slots involved.
	Disabled,
	/// Requests are gated by both caps.
	Limited(DispatchLimits),
}
impl Throttle {
	/// Shorthand for [`Throttle::Limited`] built from [`DispatchLimits::new`].
	pub fn limited(
		max_per_period: u32,
		period: StdDuration,
		max_parallel: i64,
	) -> Result<Self, ConfigError> {
		DispatchLimits::new(max_per_period, period, max_parallel).map(Self::Limited)
	}

	/// Returns the limits when throttling is enabled.
	pub fn limits(&self) -> Option<&DispatchLimits> {
		match self {
			Self::Disabled => None,
			Self::Limited(limits) => Some(limits),
		}
	}
}
impl From<DispatchLimits> for Throttle {
	fn from(limits: DispatchLimits) -> Self {
		Self::Limited(limits)
	}
}
impl TryFrom<ThrottleSettings> for Throttle {
	type Error = ConfigError;

	fn try_from(settings: ThrottleSettings) -> Result<Self, Self::Error> {
		if !settings.enabled {
			return Ok(Self::Disabled);
		}

		Self::limited(
			settings.max_per_period,
			StdDuration::from_millis(settings.period_ms),
			settings.max_parallel,
		)
	}
}

/// Serializable throttle configuration supplied by the host system.
///
/// ```json
/// { "enabled": true, "max_per_period": 40, "period_ms": 60000, "max_parallel": 4 }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleSettings {
	/// Turns throttling on; when `false` the dispatcher passes requests straight through.
	#[serde(default = "ThrottleSettings::default_enabled")]
	pub enabled: bool,
	/// Admissions allowed per window.
	pub max_per_period: u32,
	/// Window length in milliseconds.
	pub period_ms: u64,
	/// Concurrency cap; out-of-range values fall back to `max_per_period`.
	#[serde(default = "ThrottleSettings::default_max_parallel")]
	pub max_parallel: i64,
}
impl ThrottleSettings {
	/// Parses settings from JSON, reporting the offending field path on failure.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::InvalidSettings { source })
	}

	/// Validates the settings into a [`Throttle`].
	pub fn into_throttle(self) -> Result<Throttle, ConfigError> {
		Throttle::try_from(self)
	}

	fn default_enabled() -> bool {
		true
	}

	fn default_max_parallel() -> i64 {
		-1
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn limits(max_per_period: u32, max_parallel: i64) -> DispatchLimits {
		DispatchLimits::new(max_per_period, StdDuration::from_secs(1), max_parallel)
			.expect("Dispatch limits should build for clamp tests.")
	}

	#[test]
	fn out_of_range_parallelism_clamps_to_period_cap() {
		assert_eq!(limits(10, -1).max_parallel(), 10);
		assert_eq!(limits(10, 11).max_parallel(), 10);
		assert_eq!(limits(10, i64::MAX).max_parallel(), 10);
		assert_eq!(limits(10, -1), limits(10, 10));
	}

	#[test]
	fn in_range_parallelism_is_kept() {
		assert_eq!(limits(40, 4).max_parallel(), 4);
		assert_eq!(limits(40, 40).max_parallel(), 40);
		assert_eq!(limits(40, 0).max_parallel(), 0);
	}

	#[test]
	fn zero_caps_are_rejected() {
		assert!(matches!(
			DispatchLimits::new(0, StdDuration::from_secs(1), 1),
			Err(ConfigError::ZeroMaxPerPeriod)
		));
		assert!(matches!(
			DispatchLimits::new(1, StdDuration::ZERO, 1),
			Err(ConfigError::ZeroPeriod)
		));
	}

	#[test]
	fn settings_parse_with_defaults() {
		let settings = ThrottleSettings::from_json(r#"{"max_per_period":40,"period_ms":60000}"#)
			.expect("Minimal throttle settings should parse.");

		assert!(settings.enabled);
		assert_eq!(settings.max_parallel, -1);

		let throttle = settings.into_throttle().expect("Settings should validate.");
		let limits = throttle.limits().expect("Enabled settings should produce limits.");

		assert_eq!(limits.max_per_period(), 40);
		assert_eq!(limits.max_parallel(), 40);
		assert_eq!(limits.period(), StdDuration::from_secs(60));
	}

	#[test]
	fn disabled_settings_skip_validation() {
		let settings = ThrottleSettings::from_json(
			r#"{"enabled":false,"max_per_period":0,"period_ms":0,"max_parallel":3}"#,
		)
		.expect("Disabled throttle settings should parse.");

		let throttle = settings.into_throttle().expect("Disabled settings should validate.");

		assert_eq!(throttle, Throttle::Disabled);
	}

	#[test]
	fn settings_errors_report_field_path() {
		let err = ThrottleSettings::from_json(r#"{"max_per_period":"many","period_ms":1}"#)
			.expect_err("A string cap should be rejected.");

		match err {
			ConfigError::InvalidSettings { source } =>
				assert_eq!(source.path().to_string(), "max_per_period"),
			other => panic!("Unexpected error: {other:?}"),
		}
	}
}

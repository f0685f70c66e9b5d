//! Typed broker configuration with reference defaults and validation.
//!
//! Serialized documents express durations in whole seconds (`*_secs` keys). Every field is
//! optional; missing fields fall back to the defaults documented on each struct.

// std
use std::{fs, path::Path};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	rate_limit::{CommandClass, RateLimiter, RatePolicy},
};

/// Longest duration any configured timer or window may use.
pub const MAX_DURATION: Duration = Duration::days(366);

/// Root configuration consumed by [`crate::broker::Broker`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
	/// Credential validity and renewal cadence.
	pub session: SessionConfig,
	/// Command execution behavior.
	pub executor: ExecutorConfig,
	/// Inventory discovery behavior.
	pub discovery: DiscoveryConfig,
	/// Intent dispatch behavior.
	pub commands: CommandConfig,
	/// Per-class overrides layered over the built-in rate policies.
	pub rate_limits: Vec<RateLimitOverride>,
}
impl BrokerConfig {
	/// Parses a JSON document, reporting the path of the first offending field.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let deserializer = &mut serde_json::Deserializer::from_str(raw);
		let config: Self = serde_path_to_error::deserialize(deserializer).map_err(|e| {
			ConfigError::Parse { path: e.path().to_string(), message: e.inner().to_string() }
		})?;

		config.validate()?;

		Ok(config)
	}

	/// Reads and parses a JSON document from disk.
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let raw = fs::read_to_string(path).map_err(|e| ConfigError::Read {
			path: path.display().to_string(),
			message: e.to_string(),
		})?;

		Self::from_json_str(&raw)
	}

	/// Rejects values the runtime cannot honor: zero counts, non-positive periods, and durations
	/// longer than [`MAX_DURATION`].
	pub fn validate(&self) -> Result<(), ConfigError> {
		let session = &self.session;
		let discovery = &self.discovery;
		let commands = &self.commands;

		positive("session.validity_window", session.validity_window)?;
		positive("session.short_refresh_interval", session.short_refresh_interval)?;
		positive("session.long_refresh_interval", session.long_refresh_interval)?;
		non_negative("session.settle_delay", session.settle_delay)?;
		at_least_one("discovery.quick.attempts", discovery.quick.attempts)?;
		non_negative("discovery.quick.spacing", discovery.quick.spacing)?;
		at_least_one("discovery.full.attempts", discovery.full.attempts)?;
		non_negative("discovery.full.spacing", discovery.full.spacing)?;
		positive("discovery.background_period", discovery.background_period)?;
		at_least_one("discovery.background_ceiling", discovery.background_ceiling)?;
		non_negative("commands.debounce_window", commands.debounce_window)?;
		at_least_one("commands.poll_attempts", commands.poll_attempts)?;
		non_negative("commands.poll_interval", commands.poll_interval)?;

		for entry in &self.rate_limits {
			positive("rate_limits.window", entry.window)?;
		}

		Ok(())
	}

	/// Builds a limiter from the built-in policies plus configured overrides.
	pub fn rate_limiter(&self) -> RateLimiter {
		self.rate_limits.iter().fold(RateLimiter::new(), |limiter, entry| {
			limiter.with_policy(entry.class, RatePolicy::new(entry.max_count, entry.window))
		})
	}
}

/// Credential validity and renewal cadence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
	/// How long acquired credentials are trusted (20 hours).
	#[serde(rename = "validity_window_secs", with = "secs")]
	pub validity_window: Duration,
	/// Pause after applying new credentials before commands may use them (2 seconds).
	#[serde(rename = "settle_delay_secs", with = "secs")]
	pub settle_delay: Duration,
	/// Period of the short proactive renewal trigger (50 minutes).
	#[serde(rename = "short_refresh_interval_secs", with = "secs")]
	pub short_refresh_interval: Duration,
	/// Period of the long proactive renewal trigger (20 hours).
	#[serde(rename = "long_refresh_interval_secs", with = "secs")]
	pub long_refresh_interval: Duration,
}
impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			validity_window: Duration::hours(20),
			settle_delay: Duration::seconds(2),
			short_refresh_interval: Duration::minutes(50),
			long_refresh_interval: Duration::hours(20),
		}
	}
}

/// Command execution behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
	/// Logs full error detail (status, target, payloads) on terminal failures.
	pub verbose: bool,
	/// Treats 5xx responses like 401/403 and forces one renewal-and-retry cycle.
	pub retry_server_errors: bool,
}
impl Default for ExecutorConfig {
	fn default() -> Self {
		Self { verbose: false, retry_server_errors: true }
	}
}

/// Bounded discovery attempts with fixed spacing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryAttempts {
	/// Number of `list_resources` calls.
	pub attempts: u32,
	/// Pause between consecutive calls.
	#[serde(rename = "spacing_secs", with = "secs")]
	pub spacing: Duration,
}
impl DiscoveryAttempts {
	/// Creates a new attempt policy.
	pub const fn new(attempts: u32, spacing: Duration) -> Self {
		Self { attempts, spacing }
	}
}

/// Inventory discovery behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
	/// Startup attempts that assume the current session is usable (3 x 2 seconds).
	pub quick: DiscoveryAttempts,
	/// Attempts made after a forced re-authentication (4 x 3 seconds).
	pub full: DiscoveryAttempts,
	/// Period between background discovery ticks (5 minutes).
	#[serde(rename = "background_period_secs", with = "secs")]
	pub background_period: Duration,
	/// Background ticks allowed before discovery gives up (12).
	pub background_ceiling: u32,
}
impl Default for DiscoveryConfig {
	fn default() -> Self {
		Self {
			quick: DiscoveryAttempts::new(3, Duration::seconds(2)),
			full: DiscoveryAttempts::new(4, Duration::seconds(3)),
			background_period: Duration::minutes(5),
			background_ceiling: 12,
		}
	}
}

/// Intent dispatch behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandConfig {
	/// Repeated invocations of one action inside this window collapse into one (10 seconds).
	#[serde(rename = "debounce_window_secs", with = "secs")]
	pub debounce_window: Duration,
	/// Status polls before a command is reported as incomplete (10).
	pub poll_attempts: u32,
	/// Pause between status polls (2 seconds).
	#[serde(rename = "poll_interval_secs", with = "secs")]
	pub poll_interval: Duration,
}
impl Default for CommandConfig {
	fn default() -> Self {
		Self {
			debounce_window: Duration::seconds(10),
			poll_attempts: 10,
			poll_interval: Duration::seconds(2),
		}
	}
}

/// Replaces the built-in policy for one command class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitOverride {
	/// Class being overridden.
	pub class: CommandClass,
	/// Maximum admissions per window; zero disables the class.
	pub max_count: u32,
	/// Window length.
	#[serde(rename = "window_secs", with = "secs")]
	pub window: Duration,
}

fn positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
	if !value.is_positive() {
		return Err(ConfigError::NonPositiveDuration { field });
	}

	bounded(field, value)
}

fn non_negative(field: &'static str, value: Duration) -> Result<(), ConfigError> {
	if value.is_negative() {
		return Err(ConfigError::NonPositiveDuration { field });
	}

	bounded(field, value)
}

fn bounded(field: &'static str, value: Duration) -> Result<(), ConfigError> {
	if value > MAX_DURATION {
		Err(ConfigError::DurationTooLong { field, max_secs: MAX_DURATION.whole_seconds() })
	} else {
		Ok(())
	}
}

fn at_least_one(field: &'static str, value: u32) -> Result<(), ConfigError> {
	if value == 0 { Err(ConfigError::ZeroCount { field }) } else { Ok(()) }
}

mod secs {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
	// self
	use crate::_prelude::Duration;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = u64::deserialize(deserializer)?;
		let secs = i64::try_from(raw).map_err(|_| D::Error::custom("duration is out of range"))?;

		Ok(Duration::seconds(secs))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_match_reference_cadence() {
		let config = BrokerConfig::default();

		assert_eq!(config.session.validity_window, Duration::hours(20));
		assert_eq!(config.session.short_refresh_interval, Duration::minutes(50));
		assert_eq!(config.discovery.quick, DiscoveryAttempts::new(3, Duration::seconds(2)));
		assert_eq!(config.discovery.full, DiscoveryAttempts::new(4, Duration::seconds(3)));
		assert_eq!(config.discovery.background_ceiling, 12);
		assert_eq!(config.commands.debounce_window, Duration::seconds(10));
		assert!(config.executor.retry_server_errors);
		config.validate().expect("Default configuration should validate.");
	}

	#[test]
	fn partial_documents_keep_defaults() {
		let config = BrokerConfig::from_json_str(
			r#"{
				"session": { "settle_delay_secs": 0 },
				"executor": { "verbose": true },
				"rate_limits": [{ "class": "engine_start", "max_count": 1, "window_secs": 600 }]
			}"#,
		)
		.expect("Partial configuration should parse.");

		assert_eq!(config.session.settle_delay, Duration::ZERO);
		assert_eq!(config.session.validity_window, Duration::hours(20));
		assert!(config.executor.verbose);
		assert_eq!(
			config.rate_limiter().policy(CommandClass::EngineStart),
			Some(RatePolicy::new(1, Duration::minutes(10)))
		);
		assert_eq!(
			config.rate_limiter().policy(CommandClass::Lock),
			Some(RatePolicy::new(10, Duration::minutes(5)))
		);
	}

	#[test]
	fn parse_errors_name_the_offending_field() {
		let err = BrokerConfig::from_json_str(r#"{ "discovery": { "background_ceiling": "many" } }"#)
			.expect_err("A string ceiling should be rejected.");

		assert!(
			matches!(&err, ConfigError::Parse { path, .. } if path == "discovery.background_ceiling"),
			"Unexpected error: {err:?}"
		);
	}

	#[test]
	fn validation_rejects_zero_counts_and_periods() {
		let err = BrokerConfig::from_json_str(r#"{ "discovery": { "background_ceiling": 0 } }"#)
			.expect_err("A zero ceiling should be rejected.");

		assert_eq!(err, ConfigError::ZeroCount { field: "discovery.background_ceiling" });

		let err =
			BrokerConfig::from_json_str(r#"{ "session": { "short_refresh_interval_secs": 0 } }"#)
				.expect_err("A zero refresh interval should be rejected.");

		assert_eq!(
			err,
			ConfigError::NonPositiveDuration { field: "session.short_refresh_interval" }
		);
	}

	#[test]
	fn validation_rejects_durations_beyond_the_cap() {
		let err = BrokerConfig::from_json_str(
			r#"{ "session": { "long_refresh_interval_secs": 9223372036854775807 } }"#,
		)
		.expect_err("An unbounded refresh interval should be rejected.");

		assert_eq!(
			err,
			ConfigError::DurationTooLong {
				field: "session.long_refresh_interval",
				max_secs: MAX_DURATION.whole_seconds(),
			}
		);

		let err = BrokerConfig::from_json_str(
			r#"{ "rate_limits": [{ "class": "lock", "max_count": 1, "window_secs": 40000000 }] }"#,
		)
		.expect_err("A rate window longer than a year should be rejected.");

		assert!(matches!(err, ConfigError::DurationTooLong { field: "rate_limits.window", .. }));

		let mut config = BrokerConfig::default();

		config.commands.poll_interval = MAX_DURATION;

		config.validate().expect("The cap itself should be accepted.");
	}

	#[test]
	fn missing_file_reports_read_error() {
		let err = BrokerConfig::from_path("/nonexistent/telematics-broker.json")
			.expect_err("Missing files should fail to load.");

		assert!(matches!(err, ConfigError::Read { .. }));
	}
}

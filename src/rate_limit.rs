//! Sliding-window admission control per command class and vehicle.
//!
//! Every [`CommandClass`] may carry a [`RatePolicy`] (`max_count` admissions per `window`).
//! Admission logs are kept per `(class, resource)` pair so one vehicle's usage never starves
//! another's. Classes without a policy are always admitted. The limiter never errors; it only
//! admits or returns a [`RetryDirective`] describing when the next admission will succeed.

// self
use crate::{_prelude::*, auth::ResourceId};

/// Remote command families with independent rate budgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandClass {
	/// Door lock.
	Lock,
	/// Door unlock.
	Unlock,
	/// Remote engine start.
	EngineStart,
	/// Remote engine stop.
	EngineStop,
	/// Horn and hazard lights.
	HornAndLights,
	/// Climate control without engine start.
	Climate,
	/// Manual inventory refresh.
	DiscoveryRefresh,
}
impl CommandClass {
	/// Every class, in declaration order.
	pub const ALL: [CommandClass; 7] = [
		CommandClass::Lock,
		CommandClass::Unlock,
		CommandClass::EngineStart,
		CommandClass::EngineStop,
		CommandClass::HornAndLights,
		CommandClass::Climate,
		CommandClass::DiscoveryRefresh,
	];

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CommandClass::Lock => "lock",
			CommandClass::Unlock => "unlock",
			CommandClass::EngineStart => "engine_start",
			CommandClass::EngineStop => "engine_stop",
			CommandClass::HornAndLights => "horn_and_lights",
			CommandClass::Climate => "climate",
			CommandClass::DiscoveryRefresh => "discovery_refresh",
		}
	}

	/// Built-in budget for the class, if it is limited at all.
	pub fn default_policy(self) -> Option<RatePolicy> {
		match self {
			CommandClass::EngineStart => Some(RatePolicy::new(3, Duration::hours(1))),
			CommandClass::Lock | CommandClass::Unlock =>
				Some(RatePolicy::new(10, Duration::minutes(5))),
			CommandClass::HornAndLights => Some(RatePolicy::new(5, Duration::minutes(5))),
			CommandClass::Climate => Some(RatePolicy::new(5, Duration::minutes(10))),
			CommandClass::DiscoveryRefresh => Some(RatePolicy::new(10, Duration::minutes(10))),
			CommandClass::EngineStop => None,
		}
	}
}
impl Display for CommandClass {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Admission budget: at most `max_count` admissions inside any `window`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RatePolicy {
	/// Maximum admissions inside one window.
	pub max_count: u32,
	/// Sliding window length.
	pub window: Duration,
}
impl RatePolicy {
	/// Creates a new policy.
	pub const fn new(max_count: u32, window: Duration) -> Self {
		Self { max_count, window }
	}
}

/// Result emitted by [`RateLimiter::can_execute`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The command may proceed immediately.
	Allow,
	/// The command must wait.
	Delay(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` when the command was admitted.
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow)
	}

	/// Time until the next admission can succeed, when denied.
	pub fn wait_time(&self) -> Option<Duration> {
		match self {
			Self::Allow => None,
			Self::Delay(directive) => Some(directive.recommended_backoff),
		}
	}

	/// Wait time rounded up to whole minutes, when denied.
	pub fn wait_minutes(&self) -> Option<i64> {
		self.wait_time().map(|wait| {
			let minutes = wait.whole_minutes();

			if wait > Duration::minutes(minutes) { minutes + 1 } else { minutes }
		})
	}
}

/// Advises callers when to retry after a [`RateLimitDecision::Delay`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Instant when it is safe to retry.
	pub earliest_retry_at: OffsetDateTime,
	/// Suggested backoff duration.
	pub recommended_backoff: Duration,
	/// Optional descriptive string.
	pub reason: Option<String>,
}
impl RetryDirective {
	/// Creates a new directive with the provided timing metadata.
	pub fn new(earliest_retry_at: OffsetDateTime, recommended_backoff: Duration) -> Self {
		Self { earliest_retry_at, recommended_backoff, reason: None }
	}

	/// Adds a human-readable reason.
	pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());

		self
	}
}

type RateKey = (CommandClass, ResourceId);

/// In-memory sliding-window limiter keyed by `(class, resource)`.
#[derive(Debug)]
pub struct RateLimiter {
	policies: HashMap<CommandClass, RatePolicy>,
	windows: Mutex<HashMap<RateKey, VecDeque<OffsetDateTime>>>,
}
impl RateLimiter {
	/// Creates a limiter with the built-in policy table.
	pub fn new() -> Self {
		let policies = CommandClass::ALL
			.into_iter()
			.filter_map(|class| class.default_policy().map(|policy| (class, policy)))
			.collect();

		Self { policies, windows: Default::default() }
	}

	/// Creates a limiter without any policies; every class is admitted until one is added.
	pub fn unlimited() -> Self {
		Self { policies: HashMap::new(), windows: Default::default() }
	}

	/// Adds or replaces the policy for `class`.
	pub fn with_policy(mut self, class: CommandClass, policy: RatePolicy) -> Self {
		self.policies.insert(class, policy);

		self
	}

	/// Returns the active policy for `class`.
	pub fn policy(&self, class: CommandClass) -> Option<RatePolicy> {
		self.policies.get(&class).copied()
	}

	/// Checks and, when admitted, records one execution at the current instant.
	pub fn can_execute(&self, class: CommandClass, resource: &ResourceId) -> RateLimitDecision {
		self.can_execute_at(class, resource, OffsetDateTime::now_utc())
	}

	/// Checks and, when admitted, records one execution at `now`.
	pub fn can_execute_at(
		&self,
		class: CommandClass,
		resource: &ResourceId,
		now: OffsetDateTime,
	) -> RateLimitDecision {
		let Some(policy) = self.policy(class) else {
			return RateLimitDecision::Allow;
		};
		let mut windows = self.windows.lock();
		let log = windows.entry((class, resource.clone())).or_default();

		Self::evict(log, now - policy.window);

		match log.front() {
			Some(&oldest) if log.len() >= policy.max_count as usize => {
				let wait = policy.window - (now - oldest);

				tracing::debug!(
					command = class.as_str(),
					resource = %resource,
					wait_secs = wait.whole_seconds(),
					"Rate limit reached."
				);

				RateLimitDecision::Delay(
					RetryDirective::new(oldest + policy.window, wait).with_reason(format!(
						"{class} is limited to {} per {}",
						policy.max_count, policy.window
					)),
				)
			},
			_ if policy.max_count == 0 => RateLimitDecision::Delay(
				RetryDirective::new(now + policy.window, policy.window)
					.with_reason(format!("{class} is disabled")),
			),
			_ => {
				log.push_back(now);

				RateLimitDecision::Allow
			},
		}
	}

	/// Number of admissions currently retained inside the window for the key.
	pub fn usage_at(
		&self,
		class: CommandClass,
		resource: &ResourceId,
		now: OffsetDateTime,
	) -> usize {
		let Some(policy) = self.policy(class) else {
			return 0;
		};
		let mut windows = self.windows.lock();

		match windows.get_mut(&(class, resource.clone())) {
			Some(log) => {
				Self::evict(log, now - policy.window);

				log.len()
			},
			None => 0,
		}
	}

	/// Clears the admission log for one `(class, resource)` pair.
	pub fn reset(&self, class: CommandClass, resource: &ResourceId) {
		self.windows.lock().remove(&(class, resource.clone()));
	}

	/// Clears every admission log.
	pub fn reset_all(&self) {
		self.windows.lock().clear();
	}

	fn evict(log: &mut VecDeque<OffsetDateTime>, cutoff: OffsetDateTime) {
		while log.front().is_some_and(|instant| *instant <= cutoff) {
			log.pop_front();
		}
	}
}
impl Default for RateLimiter {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn vin(value: &str) -> ResourceId {
		ResourceId::new(value).expect("VIN fixture should be valid.")
	}

	#[test]
	fn eleventh_lock_within_five_minutes_is_denied() {
		let limiter = RateLimiter::new();
		let vin1 = vin("VIN1");
		let start = macros::datetime!(2025-11-10 12:00 UTC);

		for i in 0..10 {
			let decision =
				limiter.can_execute_at(CommandClass::Lock, &vin1, start + Duration::seconds(i * 20));

			assert!(decision.is_allowed(), "Admission {i} should be allowed.");
		}

		let denied =
			limiter.can_execute_at(CommandClass::Lock, &vin1, start + Duration::minutes(4));

		assert!(!denied.is_allowed());
		assert_eq!(denied.wait_time(), Some(Duration::minutes(1)));
		assert_eq!(denied.wait_minutes(), Some(1));
	}

	#[test]
	fn admission_resumes_once_earliest_entry_leaves_window() {
		let limiter = RateLimiter::new();
		let vin1 = vin("VIN1");
		let start = macros::datetime!(2025-11-10 12:00 UTC);

		for i in 0..3 {
			assert!(
				limiter
					.can_execute_at(CommandClass::EngineStart, &vin1, start + Duration::minutes(i))
					.is_allowed()
			);
		}

		let denied = limiter.can_execute_at(
			CommandClass::EngineStart,
			&vin1,
			start + Duration::minutes(30),
		);

		assert_eq!(denied.wait_time(), Some(Duration::minutes(30)));
		assert!(
			limiter
				.can_execute_at(CommandClass::EngineStart, &vin1, start + Duration::hours(1))
				.is_allowed()
		);
		assert_eq!(
			limiter.usage_at(CommandClass::EngineStart, &vin1, start + Duration::hours(1)),
			3
		);
	}

	#[test]
	fn limits_are_isolated_per_class_and_resource() {
		let limiter = RateLimiter::new();
		let vin_a = vin("VIN_A");
		let vin_b = vin("VIN_B");
		let now = macros::datetime!(2025-11-10 12:00 UTC);

		for _ in 0..10 {
			assert!(limiter.can_execute_at(CommandClass::Lock, &vin_a, now).is_allowed());
		}

		assert!(!limiter.can_execute_at(CommandClass::Lock, &vin_a, now).is_allowed());
		assert!(limiter.can_execute_at(CommandClass::Lock, &vin_b, now).is_allowed());
		assert!(limiter.can_execute_at(CommandClass::EngineStart, &vin_a, now).is_allowed());
	}

	#[test]
	fn unconfigured_classes_are_always_allowed() {
		let limiter = RateLimiter::new();
		let vin1 = vin("VIN1");
		let now = macros::datetime!(2025-11-10 12:00 UTC);

		for _ in 0..100 {
			assert!(limiter.can_execute_at(CommandClass::EngineStop, &vin1, now).is_allowed());
		}

		assert!(RateLimiter::unlimited().policy(CommandClass::Lock).is_none());
	}

	#[test]
	fn reset_clears_logs() {
		let limiter = RateLimiter::unlimited()
			.with_policy(CommandClass::HornAndLights, RatePolicy::new(1, Duration::minutes(5)));
		let vin1 = vin("VIN1");
		let vin2 = vin("VIN2");
		let now = macros::datetime!(2025-11-10 12:00 UTC);

		assert!(limiter.can_execute_at(CommandClass::HornAndLights, &vin1, now).is_allowed());
		assert!(limiter.can_execute_at(CommandClass::HornAndLights, &vin2, now).is_allowed());
		assert!(!limiter.can_execute_at(CommandClass::HornAndLights, &vin1, now).is_allowed());

		limiter.reset(CommandClass::HornAndLights, &vin1);

		assert!(limiter.can_execute_at(CommandClass::HornAndLights, &vin1, now).is_allowed());
		assert!(!limiter.can_execute_at(CommandClass::HornAndLights, &vin2, now).is_allowed());

		limiter.reset_all();

		assert!(limiter.can_execute_at(CommandClass::HornAndLights, &vin2, now).is_allowed());
	}
}

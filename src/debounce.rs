//! Per-action duplicate suppression applied before commands reach the executor.
//!
//! Presentation layers often fire the same intent several times in quick succession. The
//! debouncer remembers when each `(resource, class)` action last ran and suppresses repeats
//! inside the window. A suppressed call is not a failure; it simply never reaches the executor.

// self
use crate::{_prelude::*, auth::ResourceId, rate_limit::CommandClass};

/// Remembers the last accepted invocation of every action.
#[derive(Debug)]
pub struct ActionDebouncer {
	window: Duration,
	last_run: Mutex<HashMap<(ResourceId, CommandClass), OffsetDateTime>>,
}
impl ActionDebouncer {
	/// Creates a debouncer; a zero window disables suppression.
	pub fn new(window: Duration) -> Self {
		Self { window, last_run: Default::default() }
	}

	/// Returns the configured window.
	pub fn window(&self) -> Duration {
		self.window
	}

	/// Accepts and records the action unless it already ran inside the window.
	pub fn should_run(&self, resource: &ResourceId, class: CommandClass) -> bool {
		self.should_run_at(resource, class, OffsetDateTime::now_utc())
	}

	/// Same as [`should_run`](Self::should_run), evaluated at `now`.
	pub fn should_run_at(
		&self,
		resource: &ResourceId,
		class: CommandClass,
		now: OffsetDateTime,
	) -> bool {
		let mut last_run = self.last_run.lock();
		let key = (resource.clone(), class);
		let suppressed = last_run.get(&key).is_some_and(|previous| now - *previous < self.window);

		if suppressed {
			tracing::debug!(
				resource = %resource,
				command = class.as_str(),
				"Duplicate invocation suppressed."
			);

			return false;
		}

		last_run.insert(key, now);

		true
	}

	/// Forgets the last invocation of one action.
	pub fn clear(&self, resource: &ResourceId, class: CommandClass) {
		self.last_run.lock().remove(&(resource.clone(), class));
	}
}
impl Default for ActionDebouncer {
	fn default() -> Self {
		Self::new(Duration::seconds(10))
	}
}

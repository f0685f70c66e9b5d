//! Self-terminating background discovery.
//!
//! Each tick forces a fresh login and runs full discovery. The loop stops itself after the first
//! non-empty listing or once the configured ceiling of attempts has been spent; until then every
//! failure is classified, logged, and retried on the next tick.

// std
use std::ops::ControlFlow;
// crates.io
use tokio::time::{self, MissedTickBehavior};
// self
use crate::{_prelude::*, directory::ResourceDirectory};

impl ResourceDirectory {
	/// Starts background discovery with an immediate first tick. No-op while already active.
	/// Must be called from within a Tokio runtime.
	pub fn start_background_refresh(self: &Arc<Self>) {
		let mut state = self.background.lock();

		if state.handle.is_some() {
			return;
		}

		state.generation += 1;
		state.attempts = 0;

		let generation = state.generation;
		let period = self.config.background_period;

		let task = Self::run_background(Arc::downgrade(self), generation, period);

		state.handle = Some(tokio::spawn(task));

		tracing::info!(
			period_secs = period.whole_seconds(),
			ceiling = self.config.background_ceiling,
			"Background discovery started."
		);
	}

	/// Cancels background discovery. Idempotent.
	pub fn stop_background_refresh(&self) {
		let handle = self.background.lock().handle.take();

		if let Some(handle) = handle {
			handle.abort();

			tracing::info!("Background discovery stopped.");
		}
	}

	/// Returns `true` while background discovery is scheduled.
	pub fn is_background_active(&self) -> bool {
		self.background.lock().handle.is_some()
	}

	/// Attempts made since background discovery was last activated.
	pub fn background_attempts(&self) -> u32 {
		self.background.lock().attempts
	}

	async fn run_background(directory: Weak<Self>, generation: u64, period: Duration) {
		if !period.is_positive() {
			tracing::warn!("Background discovery disabled: non-positive period.");

			if let Some(directory) = directory.upgrade() {
				directory.finish_background(generation);
			}

			return;
		}

		let mut interval = time::interval(to_std(period));

		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			interval.tick().await;

			let Some(directory) = directory.upgrade() else {
				break;
			};

			if directory.background_tick(generation).await.is_break() {
				break;
			}
		}
	}

	async fn background_tick(&self, generation: u64) -> ControlFlow<()> {
		let ceiling = self.config.background_ceiling;
		let Some(attempt) = self.begin_attempt(generation) else {
			return ControlFlow::Break(());
		};

		tracing::info!(attempt, ceiling, "Background discovery attempt.");

		let outcome = async {
			self.session.force_renew().await?;
			self.list_with(self.config.full, "background").await
		}
		.await;

		match outcome {
			Ok(entries) if !entries.is_empty() => {
				self.adopt(&entries).await;
				self.finish_background(generation);

				tracing::info!(
					attempt,
					count = entries.len(),
					"Background discovery found vehicles."
				);

				return ControlFlow::Break(());
			},
			Ok(_) => tracing::warn!(
				attempt,
				ceiling,
				"Background discovery still found no vehicles; will retry on next tick."
			),
			Err(e) => tracing::warn!(
				attempt,
				ceiling,
				kind = e.kind().as_str(),
				error = %e,
				"Background discovery failed ({}); will retry on next tick.",
				discovery_cause(e.kind())
			),
		}

		if attempt >= ceiling {
			self.finish_background(generation);

			tracing::warn!(
				attempts = attempt,
				"Background discovery gave up; the cached inventory stays in use until restart."
			);

			return ControlFlow::Break(());
		}

		ControlFlow::Continue(())
	}

	// Counts one attempt for the current activation; `None` when this task was superseded or the
	// ceiling is already spent.
	fn begin_attempt(&self, generation: u64) -> Option<u32> {
		let mut state = self.background.lock();

		if state.generation != generation || state.handle.is_none() {
			return None;
		}
		if state.attempts >= self.config.background_ceiling {
			state.handle = None;

			return None;
		}

		state.attempts += 1;

		Some(state.attempts)
	}

	// Deactivates from inside the loop; the handle is dropped (detached), not aborted.
	fn finish_background(&self, generation: u64) {
		let mut state = self.background.lock();

		if state.generation == generation {
			state.handle = None;
		}
	}
}

fn discovery_cause(kind: FailureKind) -> &'static str {
	match kind {
		FailureKind::NetworkUnreachable => "unreachable network",
		FailureKind::AuthExpired => "invalid credentials",
		_ => "other error",
	}
}

//! Intent dispatch: debounce, admission, authenticated execution, then state publication.
//!
//! [`CommandDispatcher::dispatch`] is the single entry point a presentation layer calls when the
//! user asks a vehicle to do something. Duplicate taps are dropped by the [`ActionDebouncer`],
//! over-budget commands are refused locally by the [`RateLimiter`], and everything else runs
//! through the [`CommandExecutor`] as "send, then poll until terminal".

// crates.io
use tokio::time;
// self
use crate::{
	_prelude::*,
	auth::ResourceId,
	backend::{CommandStatus, RemoteCommand, TelematicsBackend},
	config::CommandConfig,
	debounce::ActionDebouncer,
	directory::ResourceDirectory,
	executor::CommandExecutor,
	rate_limit::{RateLimitDecision, RateLimiter, RetryDirective},
};

/// What happened to one dispatched intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// The vehicle confirmed the command.
	Completed(CommandStatus),
	/// The same action ran inside the debounce window; nothing was sent.
	Suppressed,
	/// The command class is over budget for this vehicle; nothing was sent.
	RateLimited(RetryDirective),
	/// Execution failed after any permitted retry.
	Failed(FailureKind),
}
impl DispatchOutcome {
	/// Returns `true` when the command completed.
	pub fn is_completed(&self) -> bool {
		matches!(self, Self::Completed(_))
	}
}

/// Routes user intents to the backend.
pub struct CommandDispatcher {
	debouncer: ActionDebouncer,
	limiter: Arc<RateLimiter>,
	executor: Arc<CommandExecutor>,
	backend: Arc<dyn TelematicsBackend>,
	directory: Arc<ResourceDirectory>,
	config: CommandConfig,
}
impl CommandDispatcher {
	/// Creates a dispatcher; the debounce window comes from `config`.
	pub fn new(
		limiter: Arc<RateLimiter>,
		executor: Arc<CommandExecutor>,
		backend: Arc<dyn TelematicsBackend>,
		directory: Arc<ResourceDirectory>,
		config: CommandConfig,
	) -> Self {
		Self {
			debouncer: ActionDebouncer::new(config.debounce_window),
			limiter,
			executor,
			backend,
			directory,
			config,
		}
	}

	/// Returns the debouncer guarding this dispatcher.
	pub fn debouncer(&self) -> &ActionDebouncer {
		&self.debouncer
	}

	/// Dispatches `command` to `target`.
	pub async fn dispatch(&self, target: &ResourceId, command: RemoteCommand) -> DispatchOutcome {
		let class = command.class();
		let label = command.label();

		if !self.debouncer.should_run(target, class) {
			return DispatchOutcome::Suppressed;
		}

		let decision = self.limiter.can_execute(class, target);

		if let RateLimitDecision::Delay(directive) = decision.clone() {
			tracing::warn!(
				label,
				resource = %target,
				wait_minutes = decision.wait_minutes().unwrap_or_default(),
				"{label} rate limited; {}.",
				FailureKind::RateLimited.user_message()
			);

			return DispatchOutcome::RateLimited(directive);
		}

		tracing::info!(label, resource = %target, "Dispatching command.");

		let command = &command;

		match self.executor.try_execute(label, move || self.send_and_poll(target, command)).await {
			Ok(status) => {
				for update in command.resulting_state() {
					self.directory.record_state(target, update);
				}

				tracing::info!(
					label,
					resource = %target,
					status = %status.status,
					"Command completed."
				);

				DispatchOutcome::Completed(status)
			},
			Err(e) => DispatchOutcome::Failed(e.kind()),
		}
	}

	async fn send_and_poll(
		&self,
		target: &ResourceId,
		command: &RemoteCommand,
	) -> Result<CommandStatus> {
		let class = command.class();
		let request = self.backend.send_command(target, command).await?;

		tracing::debug!(resource = %target, request = %request, "Command accepted; polling.");

		for attempt in 1..=self.config.poll_attempts {
			if self.config.poll_interval.is_positive() {
				time::sleep(to_std(self.config.poll_interval)).await;
			}

			let status = self.backend.poll_status(target, class, &request).await?;

			match status.success {
				Some(true) => return Ok(status),
				Some(false) =>
					return Err(Error::CommandRejected {
						command: class,
						target: target.to_string(),
						status: status.status,
					}),
				None => tracing::debug!(attempt, status = %status.status, "Command still pending."),
			}
		}

		Err(Error::CommandIncomplete {
			command: class,
			target: target.to_string(),
			attempts: self.config.poll_attempts,
		})
	}
}
impl Debug for CommandDispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CommandDispatcher")
			.field("config", &self.config)
			.field("executor", &self.executor)
			.finish()
	}
}

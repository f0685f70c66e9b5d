//! Authentication-aware execution of remote operations.
//!
//! [`CommandExecutor::execute`] makes sure the session is fresh, runs the caller's operation, and
//! classifies any failure. Session-related failures (401/403, and 5xx unless disabled through
//! [`ExecutorConfig::retry_server_errors`]) force one full renewal followed by exactly one retry;
//! everything else is logged and returned without retrying.

mod metrics;

pub use metrics::ExecutorMetrics;

// self
use crate::{
	_prelude::*,
	config::ExecutorConfig,
	error::truncate_body,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::SessionManager,
};

/// Position of an operation invocation inside one `execute` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptKind {
	/// First invocation.
	Immediate,
	/// Single retry after a forced renewal.
	AuthRetry,
}
impl AttemptKind {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			AttemptKind::Immediate => "immediate",
			AttemptKind::AuthRetry => "auth_retry",
		}
	}
}

/// One failed invocation, as reported in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandAttempt {
	/// Which invocation failed.
	pub kind: AttemptKind,
	/// Classification of the failure.
	pub failure: FailureKind,
}

// Technical detail attached to terminal failures in verbose mode only.
#[derive(Debug, Default, PartialEq, Eq)]
struct FailureDetail<'a> {
	target: Option<&'a str>,
	request_body: Option<String>,
	response_body: Option<String>,
}

/// Runs remote operations with one forced-renewal retry on session-related failures.
pub struct CommandExecutor {
	session: Arc<SessionManager>,
	config: ExecutorConfig,
	/// Shared counters for command outcomes.
	pub metrics: Arc<ExecutorMetrics>,
}
impl CommandExecutor {
	/// Creates an executor bound to the shared session manager.
	pub fn new(session: Arc<SessionManager>, config: ExecutorConfig) -> Self {
		Self { session, config, metrics: Default::default() }
	}

	/// Returns the session manager used for freshness checks.
	pub fn session(&self) -> &Arc<SessionManager> {
		&self.session
	}

	/// Runs `operation` and returns its result, or `None` after logging a terminal failure.
	pub async fn execute<T, F, Fut>(&self, label: &str, operation: F) -> Option<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		self.try_execute(label, operation).await.ok()
	}

	/// Same as [`execute`](Self::execute) but hands the terminal error back to the caller.
	pub async fn try_execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		const KIND: FlowKind = FlowKind::Command;

		let span = FlowSpan::new(KIND, "execute");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_command();

		let result = span
			.instrument(async {
				self.session
					.ensure_fresh()
					.await
					.inspect_err(|e| self.report_failure(label, AttemptKind::Immediate, e))?;

				let err = match operation().await {
					Ok(value) => return Ok(value),
					Err(e) => e,
				};
				let failure = err.kind();

				if !self.should_retry(failure) {
					self.report_failure(label, AttemptKind::Immediate, &err);

					return Err(err);
				}

				tracing::info!(
					label,
					kind = failure.as_str(),
					status = ?err.status(),
					"{label} hit a session-related failure; renewing credentials and retrying once."
				);
				self.metrics.record_auth_retry();
				self.session.force_expire();
				self.session
					.ensure_fresh()
					.await
					.inspect_err(|e| self.report_failure(label, AttemptKind::AuthRetry, e))?;

				operation()
					.await
					.inspect_err(|e| self.report_failure(label, AttemptKind::AuthRetry, e))
			})
			.await;

		match &result {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(_) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	fn should_retry(&self, failure: FailureKind) -> bool {
		failure.is_session_related()
			&& (failure != FailureKind::ServerTransient || self.config.retry_server_errors)
	}

	fn report_failure(&self, label: &str, kind: AttemptKind, err: &Error) {
		let attempt = CommandAttempt { kind, failure: err.kind() };
		let Some(detail) = failure_detail(err, self.config.verbose) else {
			tracing::error!(
				label,
				attempt = attempt.kind.as_str(),
				kind = attempt.failure.as_str(),
				status = ?err.status(),
				"{label} failed: {}.",
				attempt.failure.user_message()
			);

			return;
		};

		tracing::error!(
			label,
			attempt = attempt.kind.as_str(),
			kind = attempt.failure.as_str(),
			status = ?err.status(),
			target = ?detail.target,
			request_body = ?detail.request_body,
			response_body = ?detail.response_body,
			error = ?err,
			"{label} failed: {}.",
			attempt.failure.user_message()
		);
	}
}
impl Debug for CommandExecutor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CommandExecutor")
			.field("config", &self.config)
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn failure_detail(err: &Error, verbose: bool) -> Option<FailureDetail<'_>> {
	if !verbose {
		return None;
	}

	let detail = match err {
		Error::Backend(backend) => FailureDetail {
			target: backend.target.as_deref(),
			request_body: backend.request_body.as_deref().map(truncate_body),
			response_body: backend.response_body.as_deref().map(truncate_body),
		},
		_ => FailureDetail::default(),
	};

	Some(detail)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::{BackendError, LOG_BODY_LIMIT, TransportError};

	#[test]
	fn payloads_are_only_reported_in_verbose_mode() {
		let err = Error::from(
			BackendError::new(502, "bad gateway")
				.with_target("/remote/lock")
				.with_request_body("{\"action\":\"lock\"}")
				.with_response_body("x".repeat(LOG_BODY_LIMIT * 2)),
		);

		assert_eq!(failure_detail(&err, false), None);

		let detail = failure_detail(&err, true).expect("Verbose mode should report detail.");

		assert_eq!(detail.target, Some("/remote/lock"));
		assert_eq!(detail.request_body.as_deref(), Some("{\"action\":\"lock\"}"));
		assert_eq!(detail.response_body.map(|body| body.len()), Some(LOG_BODY_LIMIT + 3));
	}

	#[test]
	fn non_backend_failures_carry_no_payloads() {
		let err = Error::from(TransportError::Timeout);

		assert_eq!(failure_detail(&err, true), Some(FailureDetail::default()));
	}

	#[test]
	fn only_session_related_kinds_are_retryable() {
		assert!(FailureKind::ServerTransient.is_session_related());
		assert!(FailureKind::AuthExpired.is_session_related());
		assert!(!FailureKind::NetworkUnreachable.is_session_related());
		assert!(!FailureKind::RateLimited.is_session_related());
		assert!(!FailureKind::Other.is_session_related());
	}
}

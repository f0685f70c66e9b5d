//! Broker-level error types and the failure classifier shared by retries and user-facing logs.

// self
use crate::{_prelude::*, rate_limit::CommandClass};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Maximum number of characters of a request/response body kept in log output.
pub const LOG_BODY_LIMIT: usize = 512;

/// Canonical broker error exposed by public APIs.
///
/// Every variant is cheap to clone so a single renewal outcome can be handed to every caller that
/// joined the in-flight attempt.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum Error {
	/// Inventory cache failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Backend answered with a failure status.
	#[error(transparent)]
	Backend(#[from] BackendError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Interactive login failed.
	#[error(transparent)]
	Acquisition(#[from] AcquisitionError),

	/// Admission was denied locally before any remote call.
	#[error("Command {command} is rate limited for another {wait}.")]
	RateLimited {
		/// Command class that was denied.
		command: CommandClass,
		/// Time until the next admission can succeed.
		wait: Duration,
	},
	/// The renewal task ended without an outcome, e.g. it panicked or the runtime shut down.
	#[error("Credential renewal was abandoned before completing.")]
	RenewalAbandoned,
	/// Status polling never observed a terminal state for the command.
	#[error("Command {command} for {target} did not complete after {attempts} status polls.")]
	CommandIncomplete {
		/// Command class being polled.
		command: CommandClass,
		/// Resource the command targeted.
		target: String,
		/// Number of polls performed.
		attempts: u32,
	},
	/// Backend reported that the command finished unsuccessfully.
	#[error("Command {command} for {target} was rejected by the vehicle: {status}.")]
	CommandRejected {
		/// Command class that was rejected.
		command: CommandClass,
		/// Resource the command targeted.
		target: String,
		/// Status string reported by the backend.
		status: String,
	},
}
impl Error {
	/// Classifies the error for retry decisions and user-facing messages.
	pub fn kind(&self) -> FailureKind {
		classify(self)
	}

	/// Returns the upstream HTTP status, when one is known.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Backend(err) => err.status,
			_ => None,
		}
	}
}

/// Failure classes consumed uniformly by the command executor and by logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
	/// Session or credentials were rejected by the backend.
	AuthExpired,
	/// Backend-side internal error.
	ServerTransient,
	/// Backend could not be reached at all.
	NetworkUnreachable,
	/// Local admission control denied the command.
	RateLimited,
	/// Anything else.
	Other,
}
impl FailureKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FailureKind::AuthExpired => "auth_expired",
			FailureKind::ServerTransient => "server_transient",
			FailureKind::NetworkUnreachable => "network_unreachable",
			FailureKind::RateLimited => "rate_limited",
			FailureKind::Other => "other",
		}
	}

	/// Returns the single-line classified message shown to users.
	pub const fn user_message(self) -> &'static str {
		match self {
			FailureKind::AuthExpired => "authentication failed",
			FailureKind::ServerTransient => "server error, will retry automatically",
			FailureKind::NetworkUnreachable => "cannot reach backend",
			FailureKind::RateLimited => "too many requests, try again later",
			FailureKind::Other => "command failed",
		}
	}

	/// Returns `true` when a forced renewal followed by one retry may recover the failure.
	pub const fn is_session_related(self) -> bool {
		matches!(self, FailureKind::AuthExpired | FailureKind::ServerTransient)
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Maps an [`Error`] onto its [`FailureKind`].
pub fn classify(error: &Error) -> FailureKind {
	match error {
		Error::Backend(err) => match err.status {
			Some(401 | 403) => FailureKind::AuthExpired,
			Some(500..=599) => FailureKind::ServerTransient,
			_ => FailureKind::Other,
		},
		Error::Transport(_) => FailureKind::NetworkUnreachable,
		Error::Acquisition(AcquisitionError::InvalidCredentials { .. }) => FailureKind::AuthExpired,
		Error::Acquisition(AcquisitionError::Unreachable { .. }) => FailureKind::NetworkUnreachable,
		Error::RateLimited { .. } => FailureKind::RateLimited,
		_ => FailureKind::Other,
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// Configuration document could not be read.
	#[error("Failed to read configuration from {path}: {message}.")]
	Read {
		/// Path that failed to load.
		path: String,
		/// Underlying I/O failure.
		message: String,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration is invalid at `{path}`: {message}.")]
	Parse {
		/// Field path reported by the deserializer.
		path: String,
		/// Underlying parser failure.
		message: String,
	},
	/// A duration that must be positive was zero or negative.
	#[error("The {field} duration must be positive.")]
	NonPositiveDuration {
		/// Offending field name.
		field: &'static str,
	},
	/// A duration exceeded the longest period timers and windows accept.
	#[error("The {field} duration must not exceed {max_secs} seconds.")]
	DurationTooLong {
		/// Offending field name.
		field: &'static str,
		/// Largest accepted value, in seconds.
		max_secs: i64,
	},
	/// A count that must be positive was zero.
	#[error("The {field} count must be at least one.")]
	ZeroCount {
		/// Offending field name.
		field: &'static str,
	},
}

/// Failure reported by the backend while serving a request.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub struct BackendError {
	/// HTTP status code, when available.
	pub status: Option<u16>,
	/// Endpoint class the request targeted.
	pub target: Option<String>,
	/// Backend- or broker-supplied summary.
	pub message: String,
	/// Request payload, if the backend client captured it.
	pub request_body: Option<String>,
	/// Response payload, if the backend client captured it.
	pub response_body: Option<String>,
}
impl BackendError {
	/// Creates an error with the provided status and message.
	pub fn new(status: u16, message: impl Into<String>) -> Self {
		Self { status: Some(status), ..Self::without_status(message) }
	}

	/// Creates an error for failures that never produced an HTTP status.
	pub fn without_status(message: impl Into<String>) -> Self {
		Self {
			status: None,
			target: None,
			message: message.into(),
			request_body: None,
			response_body: None,
		}
	}

	/// Attaches the endpoint class the request targeted.
	pub fn with_target(mut self, target: impl Into<String>) -> Self {
		self.target = Some(target.into());

		self
	}

	/// Attaches the request payload.
	pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
		self.request_body = Some(body.into());

		self
	}

	/// Attaches the response payload.
	pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
		self.response_body = Some(body.into());

		self
	}
}
impl Display for BackendError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let target = self.target.as_deref().unwrap_or("<unknown>");

		write!(f, "Backend request to {target} failed with status ")?;

		match self.status {
			Some(status) => write!(f, "{status}")?,
			None => f.write_str("<none>")?,
		}

		write!(f, ": {}.", self.message)
	}
}

/// Transport-level failures (network, IO).
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend: {message}.")]
	Network {
		/// Transport-specific error summary.
		message: String,
	},
	/// Request exceeded the transport's own timeout.
	#[error("Backend call timed out.")]
	Timeout,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl std::error::Error) -> Self {
		Self::Network { message: src.to_string() }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::network(e)
	}
}

/// Failures raised by the interactive credential acquisition.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AcquisitionError {
	/// Backend rejected the configured username/password.
	#[error("Login was rejected: {reason}.")]
	InvalidCredentials {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Login page could not be reached.
	#[error("Login endpoint is unreachable: {reason}.")]
	Unreachable {
		/// Transport-supplied reason string.
		reason: String,
	},
	/// Login completed without producing usable tokens.
	#[error("Login did not yield usable credentials: {reason}.")]
	Incomplete {
		/// Driver-supplied reason string.
		reason: String,
	},
}

/// Shortens a payload to [`LOG_BODY_LIMIT`] characters for log output.
pub fn truncate_body(body: &str) -> String {
	if body.chars().count() <= LOG_BODY_LIMIT {
		return body.to_owned();
	}

	let mut truncated: String = body.chars().take(LOG_BODY_LIMIT).collect();

	truncated.push_str("...");

	truncated
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn classify_maps_status_families() {
		assert_eq!(classify(&BackendError::new(401, "unauthorized").into()), FailureKind::AuthExpired);
		assert_eq!(classify(&BackendError::new(403, "forbidden").into()), FailureKind::AuthExpired);
		assert_eq!(classify(&BackendError::new(500, "boom").into()), FailureKind::ServerTransient);
		assert_eq!(classify(&BackendError::new(503, "busy").into()), FailureKind::ServerTransient);
		assert_eq!(classify(&BackendError::new(400, "bad request").into()), FailureKind::Other);
		assert_eq!(classify(&BackendError::without_status("no status").into()), FailureKind::Other);
	}

	#[test]
	fn classify_maps_transport_and_login_failures() {
		assert_eq!(
			classify(&TransportError::Timeout.into()),
			FailureKind::NetworkUnreachable
		);
		assert_eq!(
			classify(&AcquisitionError::InvalidCredentials { reason: "bad password".into() }.into()),
			FailureKind::AuthExpired
		);
		assert_eq!(
			classify(&AcquisitionError::Unreachable { reason: "dns".into() }.into()),
			FailureKind::NetworkUnreachable
		);
		assert_eq!(classify(&Error::RenewalAbandoned), FailureKind::Other);
	}

	#[test]
	fn rate_limited_errors_report_wait() {
		let err = Error::RateLimited { command: CommandClass::Lock, wait: Duration::minutes(2) };

		assert_eq!(err.kind(), FailureKind::RateLimited);
		assert!(err.to_string().contains("lock"));
	}

	#[test]
	fn backend_error_display_includes_target_and_status() {
		let err = BackendError::new(500, "internal error").with_target("/remote/lock");

		assert_eq!(
			err.to_string(),
			"Backend request to /remote/lock failed with status 500: internal error."
		);
		assert_eq!(Error::from(err).status(), Some(500));
	}

	#[test]
	fn truncate_body_caps_long_payloads() {
		let long = "x".repeat(LOG_BODY_LIMIT + 10);
		let truncated = truncate_body(&long);

		assert_eq!(truncated.len(), LOG_BODY_LIMIT + 3);
		assert!(truncated.ends_with("..."));
		assert_eq!(truncate_body("short"), "short");
	}
}

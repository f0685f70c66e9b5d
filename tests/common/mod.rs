//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
};
// crates.io
use parking_lot::Mutex;
use time::Duration;
// self
use telematics_broker::{
	auth::{CredentialSet, RequestId, ResourceId},
	backend::{
		BackendFuture, CommandStatus, CredentialAcquirer, PresentationSink, RemoteCommand,
		ResourceDescriptor, StateUpdate, TelematicsBackend,
	},
	config::{BrokerConfig, DiscoveryAttempts, DiscoveryConfig, SessionConfig},
	error::{AcquisitionError, BackendError, Error, Result, TransportError},
	rate_limit::CommandClass,
};

pub fn vin(value: &str) -> ResourceId {
	ResourceId::new(value).expect("VIN fixture should be a valid identifier.")
}

pub fn vehicle(id: &str, name: &str) -> ResourceDescriptor {
	ResourceDescriptor::new(vin(id), name).with_model("Ioniq 5").with_year(2023)
}

pub fn auth_failure(status: u16) -> Error {
	BackendError::new(status, "Session rejected").with_target("command").into()
}

pub fn network_failure() -> Error {
	TransportError::Network { message: "connection refused".into() }.into()
}

pub fn invalid_login() -> Error {
	AcquisitionError::InvalidCredentials { reason: "wrong password".into() }.into()
}

/// Millisecond-scale timings so lifecycle tests finish quickly.
pub fn fast_config() -> BrokerConfig {
	BrokerConfig {
		session: SessionConfig { settle_delay: Duration::ZERO, ..Default::default() },
		discovery: DiscoveryConfig {
			quick: DiscoveryAttempts::new(2, Duration::milliseconds(1)),
			full: DiscoveryAttempts::new(2, Duration::milliseconds(1)),
			background_period: Duration::milliseconds(20),
			background_ceiling: 3,
		},
		commands: telematics_broker::config::CommandConfig {
			poll_interval: Duration::ZERO,
			poll_attempts: 3,
			..Default::default()
		},
		..Default::default()
	}
}

/// Login driver that counts calls and replays queued outcomes before falling back to success.
#[derive(Debug, Default)]
pub struct ScriptedAcquirer {
	calls: AtomicU32,
	delay: Option<std::time::Duration>,
	outcomes: Mutex<VecDeque<Result<CredentialSet>>>,
}
impl ScriptedAcquirer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn push(&self, outcome: Result<CredentialSet>) {
		self.outcomes.lock().push_back(outcome);
	}

	pub fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}
}
impl CredentialAcquirer for ScriptedAcquirer {
	fn acquire(&self) -> BackendFuture<'_, CredentialSet> {
		Box::pin(async move {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			let queued = self.outcomes.lock().pop_front();

			queued.unwrap_or_else(|| {
				Ok(CredentialSet::new().with("access_token", format!("token-{call}")))
			})
		})
	}
}

/// Backend whose answers are queued per operation; empty queues fall back to success.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
	applied: AtomicU32,
	primes: AtomicU32,
	sends: AtomicU32,
	polls: AtomicU32,
	lists: AtomicU32,
	send_outcomes: Mutex<VecDeque<Result<RequestId>>>,
	poll_outcomes: Mutex<VecDeque<Result<CommandStatus>>>,
	list_outcomes: Mutex<VecDeque<Result<Vec<ResourceDescriptor>>>>,
	list_fallback: Mutex<Vec<ResourceDescriptor>>,
	sent: Mutex<Vec<(ResourceId, RemoteCommand)>>,
	last_credentials: Mutex<Option<Arc<CredentialSet>>>,
}
impl ScriptedBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push_send(&self, outcome: Result<RequestId>) {
		self.send_outcomes.lock().push_back(outcome);
	}

	pub fn push_poll(&self, outcome: Result<CommandStatus>) {
		self.poll_outcomes.lock().push_back(outcome);
	}

	pub fn push_list(&self, outcome: Result<Vec<ResourceDescriptor>>) {
		self.list_outcomes.lock().push_back(outcome);
	}

	/// Listing returned once the queue is drained (empty by default).
	pub fn set_list_fallback(&self, entries: Vec<ResourceDescriptor>) {
		*self.list_fallback.lock() = entries;
	}

	pub fn applied(&self) -> u32 {
		self.applied.load(Ordering::SeqCst)
	}

	pub fn primes(&self) -> u32 {
		self.primes.load(Ordering::SeqCst)
	}

	pub fn sends(&self) -> u32 {
		self.sends.load(Ordering::SeqCst)
	}

	pub fn polls(&self) -> u32 {
		self.polls.load(Ordering::SeqCst)
	}

	pub fn lists(&self) -> u32 {
		self.lists.load(Ordering::SeqCst)
	}

	pub fn sent(&self) -> Vec<(ResourceId, RemoteCommand)> {
		self.sent.lock().clone()
	}

	pub fn last_credentials(&self) -> Option<Arc<CredentialSet>> {
		self.last_credentials.lock().clone()
	}
}
impl TelematicsBackend for ScriptedBackend {
	fn apply_credentials(&self, credentials: Arc<CredentialSet>) -> BackendFuture<'_, ()> {
		Box::pin(async move {
			self.applied.fetch_add(1, Ordering::SeqCst);
			*self.last_credentials.lock() = Some(credentials);

			Ok(())
		})
	}

	fn prime_session(&self) -> BackendFuture<'_, ()> {
		Box::pin(async move {
			self.primes.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}

	fn send_command<'a>(
		&'a self,
		target: &'a ResourceId,
		command: &'a RemoteCommand,
	) -> BackendFuture<'a, RequestId> {
		Box::pin(async move {
			let call = self.sends.fetch_add(1, Ordering::SeqCst) + 1;

			self.sent.lock().push((target.clone(), command.clone()));
			self.send_outcomes.lock().pop_front().unwrap_or_else(|| {
				Ok(RequestId::new(format!("req-{call}")).expect("Request fixture should be valid."))
			})
		})
	}

	fn poll_status<'a>(
		&'a self,
		_: &'a ResourceId,
		_: CommandClass,
		_: &'a RequestId,
	) -> BackendFuture<'a, CommandStatus> {
		Box::pin(async move {
			self.polls.fetch_add(1, Ordering::SeqCst);
			self.poll_outcomes
				.lock()
				.pop_front()
				.unwrap_or_else(|| Ok(CommandStatus::succeeded("SUCCESS")))
		})
	}

	fn list_resources(&self) -> BackendFuture<'_, Vec<ResourceDescriptor>> {
		Box::pin(async move {
			self.lists.fetch_add(1, Ordering::SeqCst);

			let queued = self.list_outcomes.lock().pop_front();

			queued.unwrap_or_else(|| Ok(self.list_fallback.lock().clone()))
		})
	}
}

/// Presentation sink that records every call.
#[derive(Debug, Default)]
pub struct RecordingPresentation {
	registered: Mutex<Vec<(ResourceId, bool)>>,
	published: Mutex<Vec<(ResourceId, StateUpdate)>>,
}
impl RecordingPresentation {
	pub fn registered(&self) -> Vec<(ResourceId, bool)> {
		self.registered.lock().clone()
	}

	pub fn published(&self) -> Vec<(ResourceId, StateUpdate)> {
		self.published.lock().clone()
	}
}
impl PresentationSink for RecordingPresentation {
	fn register(&self, descriptor: &ResourceDescriptor, is_new: bool) {
		self.registered.lock().push((descriptor.id.clone(), is_new));
	}

	fn publish(&self, resource: &ResourceId, update: StateUpdate) {
		self.published.lock().push((resource.clone(), update));
	}
}

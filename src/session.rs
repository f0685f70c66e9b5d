//! Credential session lifecycle with single-flight renewal and scheduled refresh triggers.
//!
//! [`SessionManager`] is the only owner of the current [`CredentialSession`]. Every path that may
//! replace it (on-demand [`SessionManager::ensure_fresh`], forced renewals after auth failures,
//! background discovery, and the two periodic triggers) funnels through one in-flight slot. The
//! login itself runs on a task owned by that slot and every caller, the first one included, waits
//! for its outcome. Cancelling a waiter never cancels the renewal, and the slot is cleared when the
//! task ends however it ends.

mod metrics;

pub use metrics::RenewalMetrics;

// crates.io
use tokio::{
	sync::watch,
	task::JoinHandle,
	time::{self, Instant, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	auth::{CredentialSession, CredentialSet},
	backend::{CredentialAcquirer, TelematicsBackend},
	config::SessionConfig,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

type RenewalOutcome = Option<Result<()>>;

/// Observable session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
	/// No login has succeeded yet.
	Unauthenticated,
	/// Credentials are inside their validity window.
	Valid,
	/// Credentials exist but aged out or were force-expired.
	Expired,
	/// A renewal is in flight.
	Renewing,
}

/// Reason a renewal was started; used for log and span fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewalTrigger {
	/// A caller found the session invalid.
	OnDemand,
	/// A caller demanded a fresh login regardless of validity.
	Forced,
	/// The short-period proactive trigger fired.
	ShortInterval,
	/// The long-period proactive trigger fired.
	LongInterval,
}
impl RenewalTrigger {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RenewalTrigger::OnDemand => "on_demand",
			RenewalTrigger::Forced => "forced",
			RenewalTrigger::ShortInterval => "short_interval",
			RenewalTrigger::LongInterval => "long_interval",
		}
	}
}

#[derive(Default)]
struct SessionState {
	session: Option<CredentialSession>,
	force_expired: bool,
	// `Some` exactly while a renewal is in flight.
	pending: Option<watch::Receiver<RenewalOutcome>>,
}

// Clears the in-flight slot however the renewal task ends.
struct PendingReset<'a>(&'a Mutex<SessionState>);
impl Drop for PendingReset<'_> {
	fn drop(&mut self) {
		self.0.lock().pending = None;
	}
}

/// Owns the credential session and serializes every renewal.
pub struct SessionManager {
	acquirer: Arc<dyn CredentialAcquirer>,
	backend: Arc<dyn TelematicsBackend>,
	config: SessionConfig,
	state: Mutex<SessionState>,
	schedulers: Mutex<Vec<JoinHandle<()>>>,
	/// Shared counters for renewal outcomes.
	pub metrics: Arc<RenewalMetrics>,
}
impl SessionManager {
	/// Creates a manager with no credentials; the first [`ensure_fresh`](Self::ensure_fresh)
	/// performs the initial login.
	pub fn new(
		acquirer: Arc<dyn CredentialAcquirer>,
		backend: Arc<dyn TelematicsBackend>,
		config: SessionConfig,
	) -> Self {
		Self {
			acquirer,
			backend,
			config,
			state: Default::default(),
			schedulers: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Returns `true` if credentials exist, were not force-expired, and are inside the window.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Validity check evaluated at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		let state = self.state.lock();

		!state.force_expired
			&& state
				.session
				.as_ref()
				.is_some_and(|session| session.is_valid_at(instant, self.config.validity_window))
	}

	/// Current lifecycle status.
	pub fn status(&self) -> SessionStatus {
		let state = self.state.lock();

		if state.pending.is_some() {
			return SessionStatus::Renewing;
		}

		match &state.session {
			None => SessionStatus::Unauthenticated,
			Some(session)
				if !state.force_expired
					&& session
						.is_valid_at(OffsetDateTime::now_utc(), self.config.validity_window) =>
				SessionStatus::Valid,
			Some(_) => SessionStatus::Expired,
		}
	}

	/// Snapshot of the current session, if any login has succeeded.
	pub fn session(&self) -> Option<CredentialSession> {
		self.state.lock().session.clone()
	}

	/// Credentials of the current session, if any.
	pub fn credentials(&self) -> Option<Arc<CredentialSet>> {
		self.state.lock().session.as_ref().map(|session| session.credentials.clone())
	}

	/// Marks the current credentials unusable so the next [`ensure_fresh`](Self::ensure_fresh)
	/// performs a real login.
	pub fn force_expire(&self) {
		self.state.lock().force_expired = true;

		tracing::debug!("Credential session force-expired.");
	}

	/// Returns immediately when the session is valid; otherwise renews it, or joins the renewal
	/// already in flight and shares its outcome.
	pub async fn ensure_fresh(self: &Arc<Self>) -> Result<()> {
		if self.is_valid() {
			return Ok(());
		}

		self.renew(RenewalTrigger::OnDemand).await
	}

	/// Forces a fresh login even if the current credentials are still valid.
	pub async fn force_renew(self: &Arc<Self>) -> Result<()> {
		self.force_expire();
		self.renew(RenewalTrigger::Forced).await
	}

	/// Starts a renewal unless one is in flight, in which case the caller waits for that one.
	///
	/// The renewal runs on its own task, so dropping the returned future only stops this caller
	/// from waiting. Must be called from within a Tokio runtime.
	pub async fn renew(self: &Arc<Self>, trigger: RenewalTrigger) -> Result<()> {
		let (receiver, joined) = {
			let mut state = self.state.lock();

			match &state.pending {
				Some(receiver) => (receiver.clone(), true),
				None => {
					let (sender, receiver) = watch::channel(None);

					state.pending = Some(receiver.clone());
					tokio::spawn(Self::lead(self.clone(), sender, trigger));

					(receiver, false)
				},
			}
		};

		if joined {
			self.metrics.record_join();

			tracing::debug!(trigger = trigger.as_str(), "Joining in-flight credential renewal.");
		}

		Self::outcome(receiver).await
	}

	/// Spawns the short- and long-period renewal triggers. Calling it again while they run is a
	/// no-op. Must be called from within a Tokio runtime.
	pub fn start_schedulers(self: &Arc<Self>) {
		let mut schedulers = self.schedulers.lock();

		if !schedulers.is_empty() {
			return;
		}

		for (trigger, period) in [
			(RenewalTrigger::ShortInterval, self.config.short_refresh_interval),
			(RenewalTrigger::LongInterval, self.config.long_refresh_interval),
		] {
			let task = Self::run_scheduler(Arc::downgrade(self), trigger, period);

			schedulers.push(tokio::spawn(task));
		}

		tracing::info!(
			short_secs = self.config.short_refresh_interval.whole_seconds(),
			long_secs = self.config.long_refresh_interval.whole_seconds(),
			"Scheduled credential renewal triggers started."
		);
	}

	/// Cancels both renewal triggers. Idempotent.
	pub fn stop_schedulers(&self) {
		let handles = std::mem::take(&mut *self.schedulers.lock());

		if handles.is_empty() {
			return;
		}

		handles.iter().for_each(JoinHandle::abort);

		tracing::info!("Scheduled credential renewal triggers stopped.");
	}

	/// Returns `true` while the periodic triggers are installed.
	pub fn schedulers_running(&self) -> bool {
		!self.schedulers.lock().is_empty()
	}

	async fn lead(
		manager: Arc<Self>,
		sender: watch::Sender<RenewalOutcome>,
		trigger: RenewalTrigger,
	) {
		const KIND: FlowKind = FlowKind::Renewal;

		let reset = PendingReset(&manager.state);
		let span = FlowSpan::new(KIND, trigger.as_str());

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		manager.metrics.record_attempt();

		let outcome = span.instrument(manager.acquire_and_apply(trigger)).await;

		match &outcome {
			Ok(()) => {
				manager.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				tracing::info!(trigger = trigger.as_str(), "Credential renewal succeeded.");
			},
			Err(e) => {
				manager.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				tracing::warn!(
					trigger = trigger.as_str(),
					kind = e.kind().as_str(),
					error = %e,
					"Credential renewal failed: {}.",
					e.kind().user_message()
				);
			},
		}

		// Free the slot first so a caller woken by the outcome can start the next renewal.
		drop(reset);
		sender.send_replace(Some(outcome));
	}

	async fn outcome(mut receiver: watch::Receiver<RenewalOutcome>) -> Result<()> {
		let outcome = match receiver.wait_for(Option::is_some).await {
			Ok(outcome) => (*outcome).clone(),
			Err(_) => None,
		};

		outcome.unwrap_or(Err(Error::RenewalAbandoned))
	}

	async fn acquire_and_apply(&self, trigger: RenewalTrigger) -> Result<()> {
		tracing::debug!(trigger = trigger.as_str(), "Acquiring vehicle backend credentials.");

		let credentials = Arc::new(self.acquirer.acquire().await?);
		let acquired_at = OffsetDateTime::now_utc();

		self.backend.apply_credentials(credentials.clone()).await?;
		self.backend.prime_session().await?;

		// Backend-side session propagation lags behind the login.
		if self.config.settle_delay.is_positive() {
			time::sleep(to_std(self.config.settle_delay)).await;
		}

		let mut state = self.state.lock();

		state.session = Some(CredentialSession { credentials, acquired_at });
		state.force_expired = false;

		Ok(())
	}

	async fn run_scheduler(manager: Weak<Self>, trigger: RenewalTrigger, period: Duration) {
		if !period.is_positive() {
			tracing::warn!(trigger = trigger.as_str(), "Renewal trigger disabled: zero period.");

			return;
		}

		let period = to_std(period);
		let mut interval = time::interval_at(Instant::now() + period, period);

		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			interval.tick().await;

			let Some(manager) = manager.upgrade() else {
				break;
			};

			// Failures are already logged by the leader; the next tick retries from scratch.
			let _ = manager.renew(trigger).await;
		}
	}
}
impl Debug for SessionManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("config", &self.config)
			.field("status", &self.status())
			.field("metrics", &self.metrics)
			.finish()
	}
}
impl Drop for SessionManager {
	fn drop(&mut self) {
		self.schedulers.get_mut().iter().for_each(JoinHandle::abort);
	}
}

//! Facade that wires every component around one shared session.

// self
use crate::{
	_prelude::*,
	auth::ResourceId,
	backend::{
		CredentialAcquirer, PresentationSink, RemoteCommand, ResourceDescriptor, TelematicsBackend,
	},
	command::{CommandDispatcher, DispatchOutcome},
	config::BrokerConfig,
	directory::ResourceDirectory,
	error::ConfigError,
	executor::CommandExecutor,
	rate_limit::RateLimiter,
	session::SessionManager,
	store::InventoryStore,
};

/// Owns the session manager, executor, limiter, directory, and dispatcher for one account.
pub struct Broker {
	config: BrokerConfig,
	session: Arc<SessionManager>,
	executor: Arc<CommandExecutor>,
	limiter: Arc<RateLimiter>,
	directory: Arc<ResourceDirectory>,
	dispatcher: CommandDispatcher,
}
impl Broker {
	/// Validates `config` and wires the components. Nothing runs until [`start`](Self::start).
	pub fn new(
		config: BrokerConfig,
		acquirer: Arc<dyn CredentialAcquirer>,
		backend: Arc<dyn TelematicsBackend>,
		store: Arc<dyn InventoryStore>,
		presentation: Arc<dyn PresentationSink>,
	) -> Result<Self, ConfigError> {
		config.validate()?;

		let session =
			Arc::new(SessionManager::new(acquirer, backend.clone(), config.session.clone()));
		let executor = Arc::new(CommandExecutor::new(session.clone(), config.executor.clone()));
		let limiter = Arc::new(config.rate_limiter());
		let directory = Arc::new(ResourceDirectory::new(
			session.clone(),
			backend.clone(),
			store,
			presentation,
			limiter.clone(),
			config.discovery.clone(),
		));
		let dispatcher = CommandDispatcher::new(
			limiter.clone(),
			executor.clone(),
			backend,
			directory.clone(),
			config.commands.clone(),
		);

		Ok(Self { config, session, executor, limiter, directory, dispatcher })
	}

	/// Starts the renewal triggers, performs the initial login, and discovers the inventory.
	///
	/// A failed initial login is logged and left to later triggers; discovery still runs so the
	/// cached inventory can be served. Must be called from within a Tokio runtime.
	pub async fn start(&self) -> Vec<ResourceDescriptor> {
		self.session.start_schedulers();

		if let Err(e) = self.session.ensure_fresh().await {
			tracing::warn!(
				kind = e.kind().as_str(),
				error = %e,
				"Initial login failed: {}.",
				e.kind().user_message()
			);
		}

		self.directory.discover().await
	}

	/// Stops the renewal triggers and background discovery. Idempotent.
	pub fn shutdown(&self) {
		self.session.stop_schedulers();
		self.directory.stop_background_refresh();

		tracing::info!("Broker shut down.");
	}

	/// Dispatches a user intent; see [`CommandDispatcher::dispatch`].
	pub async fn dispatch(&self, target: &ResourceId, command: RemoteCommand) -> DispatchOutcome {
		self.dispatcher.dispatch(target, command).await
	}

	/// Manually refreshes the inventory on behalf of `requested_by`.
	pub async fn refresh_inventory(
		&self,
		requested_by: &ResourceId,
	) -> Result<Vec<ResourceDescriptor>> {
		self.directory.refresh(requested_by).await
	}

	/// Returns the validated configuration.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Returns the shared session manager.
	pub fn session(&self) -> &Arc<SessionManager> {
		&self.session
	}

	/// Returns the command executor, for operations outside the built-in intents.
	pub fn executor(&self) -> &Arc<CommandExecutor> {
		&self.executor
	}

	/// Returns the shared rate limiter.
	pub fn limiter(&self) -> &Arc<RateLimiter> {
		&self.limiter
	}

	/// Returns the resource directory.
	pub fn directory(&self) -> &Arc<ResourceDirectory> {
		&self.directory
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("session", &self.session)
			.field("directory", &self.directory)
			.field("dispatcher", &self.dispatcher)
			.finish()
	}
}

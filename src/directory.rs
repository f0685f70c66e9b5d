//! Vehicle inventory discovery with a durable cache fallback.
//!
//! [`ResourceDirectory::discover`] bounds startup latency: it tries a few quick listings against
//! the current session and, when they come back empty, serves the persisted inventory (if any)
//! while [background discovery](ResourceDirectory::start_background_refresh) keeps retrying with
//! forced re-authentication. Every non-empty listing is persisted and merged into the registry by
//! stable identifier, so presentation state attached to known vehicles survives rediscovery.

mod background;

// crates.io
use tokio::{task::JoinHandle, time};
// self
use crate::{
	_prelude::*,
	auth::ResourceId,
	backend::{PresentationSink, ResourceDescriptor, StateField, StateUpdate, TelematicsBackend},
	config::{DiscoveryAttempts, DiscoveryConfig},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	rate_limit::{CommandClass, RateLimitDecision, RateLimiter},
	session::SessionManager,
	store::{InventorySnapshot, InventoryStore},
};

/// Vehicle known to the directory, with the presentation state attached to it.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisteredResource {
	/// Latest descriptor reported by discovery.
	pub descriptor: ResourceDescriptor,
	/// Last published value of each presentation field.
	pub state: BTreeMap<StateField, serde_json::Value>,
}

#[derive(Default)]
struct BackgroundState {
	// Incremented on every activation so a finishing task never tears down its successor.
	generation: u64,
	attempts: u32,
	// `Some` exactly while background discovery is active.
	handle: Option<JoinHandle<()>>,
}

/// Inventory cache, registry, and background discovery loop.
pub struct ResourceDirectory {
	session: Arc<SessionManager>,
	backend: Arc<dyn TelematicsBackend>,
	store: Arc<dyn InventoryStore>,
	presentation: Arc<dyn PresentationSink>,
	limiter: Arc<RateLimiter>,
	config: DiscoveryConfig,
	registry: RwLock<BTreeMap<ResourceId, RegisteredResource>>,
	background: Mutex<BackgroundState>,
	persist_guard: AsyncMutex<()>,
}
impl ResourceDirectory {
	/// Creates a directory with an empty registry and inactive background discovery.
	pub fn new(
		session: Arc<SessionManager>,
		backend: Arc<dyn TelematicsBackend>,
		store: Arc<dyn InventoryStore>,
		presentation: Arc<dyn PresentationSink>,
		limiter: Arc<RateLimiter>,
		config: DiscoveryConfig,
	) -> Self {
		Self {
			session,
			backend,
			store,
			presentation,
			limiter,
			config,
			registry: Default::default(),
			background: Default::default(),
			persist_guard: AsyncMutex::new(()),
		}
	}

	/// Produces the best available inventory with bounded latency.
	///
	/// Returns the fresh listing when quick discovery succeeds; otherwise returns the cached
	/// inventory (or nothing) and starts background discovery. Never fails.
	pub async fn discover(self: &Arc<Self>) -> Vec<ResourceDescriptor> {
		const KIND: FlowKind = FlowKind::Discovery;

		let span = FlowSpan::new(KIND, "discover");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let entries = span
			.instrument(async {
				let cached = self.load_cache().await;
				let fresh = self.list_with(self.config.quick, "quick").await.unwrap_or_else(|e| {
					tracing::warn!(
						kind = e.kind().as_str(),
						error = %e,
						"Quick discovery failed: {}.",
						e.kind().user_message()
					);

					Vec::new()
				});

				if !fresh.is_empty() {
					self.stop_background_refresh();
					self.adopt(&fresh).await;

					tracing::info!(count = fresh.len(), "Discovered vehicles.");

					return fresh;
				}

				self.start_background_refresh();

				match cached {
					Some(snapshot) => {
						tracing::info!(
							count = snapshot.entries().len(),
							saved_at = %snapshot.saved_at(),
							"Discovery returned no vehicles; serving the cached inventory."
						);

						let entries = snapshot.into_entries();

						self.merge(&entries);

						entries
					},
					None => {
						tracing::warn!(
							"Discovery returned no vehicles and no cache exists."
						);

						Vec::new()
					},
				}
			})
			.await;

		obs::record_flow_outcome(
			KIND,
			if entries.is_empty() { FlowOutcome::Failure } else { FlowOutcome::Success },
		);

		entries
	}

	/// Manually refreshes the inventory using full discovery, subject to the
	/// [`CommandClass::DiscoveryRefresh`] budget of the requesting vehicle.
	pub async fn refresh(&self, requested_by: &ResourceId) -> Result<Vec<ResourceDescriptor>> {
		if let RateLimitDecision::Delay(directive) =
			self.limiter.can_execute(CommandClass::DiscoveryRefresh, requested_by)
		{
			return Err(Error::RateLimited {
				command: CommandClass::DiscoveryRefresh,
				wait: directive.recommended_backoff,
			});
		}

		self.session.ensure_fresh().await?;

		let entries = self.list_with(self.config.full, "refresh").await?;

		if !entries.is_empty() {
			self.stop_background_refresh();
			self.adopt(&entries).await;
		}

		Ok(entries)
	}

	/// Snapshot of every registered vehicle.
	pub fn registered(&self) -> Vec<RegisteredResource> {
		self.registry.read().values().cloned().collect()
	}

	/// Registered vehicle with the given identifier.
	pub fn resource(&self, id: &ResourceId) -> Option<RegisteredResource> {
		self.registry.read().get(id).cloned()
	}

	/// Records a state value for a vehicle and forwards it to the presentation sink.
	pub fn record_state(&self, resource: &ResourceId, update: StateUpdate) {
		if let Some(entry) = self.registry.write().get_mut(resource) {
			entry.state.insert(update.field, update.value.clone());
		}

		self.presentation.publish(resource, update);
	}

	async fn load_cache(&self) -> Option<InventorySnapshot> {
		match self.store.load().await {
			Ok(snapshot) => snapshot,
			Err(e) => {
				tracing::warn!(error = %e, "Failed to read the inventory cache.");

				None
			},
		}
	}

	async fn list_with(
		&self,
		policy: DiscoveryAttempts,
		stage: &'static str,
	) -> Result<Vec<ResourceDescriptor>> {
		let mut last_error = None;

		for attempt in 1..=policy.attempts {
			match self.backend.list_resources().await {
				Ok(entries) if !entries.is_empty() => return Ok(entries),
				Ok(_) => {
					tracing::debug!(stage, attempt, "Discovery returned no vehicles.");

					last_error = None;
				},
				Err(e) => {
					tracing::debug!(stage, attempt, error = %e, "Discovery attempt failed.");

					last_error = Some(e);
				},
			}

			if attempt < policy.attempts && policy.spacing.is_positive() {
				time::sleep(to_std(policy.spacing)).await;
			}
		}

		match last_error {
			Some(e) => Err(e),
			None => Ok(Vec::new()),
		}
	}

	async fn adopt(&self, entries: &[ResourceDescriptor]) {
		let _guard = self.persist_guard.lock().await;
		let saved = match InventorySnapshot::new(entries.to_vec(), OffsetDateTime::now_utc()) {
			Some(snapshot) => self.store.save(snapshot).await,
			None => Ok(()),
		};

		if let Err(e) = saved {
			tracing::warn!(error = %e, "Failed to persist the inventory cache.");
		}

		self.merge(entries);
	}

	fn merge(&self, entries: &[ResourceDescriptor]) {
		let merged = {
			let mut registry = self.registry.write();

			entries
				.iter()
				.map(|descriptor| {
					let is_new = match registry.get_mut(&descriptor.id) {
						Some(existing) => {
							existing.descriptor = descriptor.clone();

							false
						},
						None => {
							registry.insert(
								descriptor.id.clone(),
								RegisteredResource {
									descriptor: descriptor.clone(),
									state: BTreeMap::new(),
								},
							);

							true
						},
					};

					(descriptor, is_new)
				})
				.collect::<Vec<_>>()
		};

		for (descriptor, is_new) in merged {
			self.presentation.register(descriptor, is_new);
		}
	}
}
impl Debug for ResourceDirectory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResourceDirectory")
			.field("config", &self.config)
			.field("registered", &self.registry.read().len())
			.field("background_active", &self.is_background_active())
			.finish()
	}
}
impl Drop for ResourceDirectory {
	fn drop(&mut self) {
		if let Some(handle) = self.background.get_mut().handle.take() {
			handle.abort();
		}
	}
}

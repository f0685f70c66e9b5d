//! Contracts for the collaborators the broker drives: the interactive login, the telematics
//! backend client, and the presentation layer that renders vehicle state.
//!
//! The broker never builds HTTP requests itself. Backend clients return classified [`Error`]
//! values (`Error::Backend` with an HTTP status, `Error::Transport` for connectivity problems) so
//! the command executor can decide whether a forced renewal is worth attempting.

// self
use crate::{
	_prelude::*,
	auth::{CredentialSet, RequestId, ResourceId},
	rate_limit::CommandClass,
};

/// Boxed future returned by collaborator contracts.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Performs the interactive login that yields a fresh [`CredentialSet`].
pub trait CredentialAcquirer
where
	Self: Send + Sync,
{
	/// Runs one login. Implementations carry their own timeouts and never retry.
	fn acquire(&self) -> BackendFuture<'_, CredentialSet>;
}

/// Backend client capable of issuing remote commands and listing vehicles.
pub trait TelematicsBackend
where
	Self: Send + Sync,
{
	/// Installs freshly acquired credentials for subsequent calls.
	fn apply_credentials(&self, credentials: Arc<CredentialSet>) -> BackendFuture<'_, ()>;

	/// Performs any backend-side session priming required after new credentials are applied.
	fn prime_session(&self) -> BackendFuture<'_, ()>;

	/// Submits a remote command and returns the backend's request identifier.
	fn send_command<'a>(
		&'a self,
		target: &'a ResourceId,
		command: &'a RemoteCommand,
	) -> BackendFuture<'a, RequestId>;

	/// Polls the completion state of a previously submitted command.
	fn poll_status<'a>(
		&'a self,
		target: &'a ResourceId,
		class: CommandClass,
		request: &'a RequestId,
	) -> BackendFuture<'a, CommandStatus>;

	/// Lists the vehicles visible to the current session.
	fn list_resources(&self) -> BackendFuture<'_, Vec<ResourceDescriptor>>;
}

/// Receives inventory and state updates for rendering.
pub trait PresentationSink
where
	Self: Send + Sync,
{
	/// Called for each vehicle after discovery merges it into the registry.
	fn register(&self, descriptor: &ResourceDescriptor, is_new: bool);

	/// Pushes one post-command or post-discovery state value.
	fn publish(&self, resource: &ResourceId, update: StateUpdate);
}

/// Sink that drops every update; useful for headless deployments.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPresentation;
impl PresentationSink for NullPresentation {
	fn register(&self, _: &ResourceDescriptor, _: bool) {}

	fn publish(&self, _: &ResourceId, _: StateUpdate) {}
}

/// Vehicle listed by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
	/// Stable identifier (VIN).
	pub id: ResourceId,
	/// User-facing nickname.
	pub name: String,
	/// Model name, when reported.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	/// Model year, when reported.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub year: Option<u16>,
	/// Additional backend attributes kept verbatim.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub attributes: BTreeMap<String, serde_json::Value>,
}
impl ResourceDescriptor {
	/// Creates a descriptor with the required fields.
	pub fn new(id: ResourceId, name: impl Into<String>) -> Self {
		Self { id, name: name.into(), model: None, year: None, attributes: BTreeMap::new() }
	}

	/// Sets the model name.
	pub fn with_model(mut self, model: impl Into<String>) -> Self {
		self.model = Some(model.into());

		self
	}

	/// Sets the model year.
	pub fn with_year(mut self, year: u16) -> Self {
		self.year = Some(year);

		self
	}
}

/// Climate parameters shared by engine start and climate commands.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClimateSettings {
	/// Cabin target temperature in degrees Celsius.
	pub target_celsius: f32,
	/// Enables front and rear defrost.
	pub defrost: bool,
	/// Run time in minutes.
	pub duration_minutes: u8,
}
impl Default for ClimateSettings {
	fn default() -> Self {
		Self { target_celsius: 21.0, defrost: false, duration_minutes: 10 }
	}
}

/// Remote command payloads understood by [`TelematicsBackend::send_command`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "settings", rename_all = "snake_case")]
pub enum RemoteCommand {
	/// Lock the doors.
	Lock,
	/// Unlock the doors.
	Unlock,
	/// Start the engine with climate settings.
	StartEngine(ClimateSettings),
	/// Stop the engine.
	StopEngine,
	/// Sound the horn and flash the lights.
	HornAndLights,
	/// Run climate control.
	Climate(ClimateSettings),
}
impl RemoteCommand {
	/// Rate-limit and polling class of the command.
	pub fn class(&self) -> CommandClass {
		match self {
			Self::Lock => CommandClass::Lock,
			Self::Unlock => CommandClass::Unlock,
			Self::StartEngine(_) => CommandClass::EngineStart,
			Self::StopEngine => CommandClass::EngineStop,
			Self::HornAndLights => CommandClass::HornAndLights,
			Self::Climate(_) => CommandClass::Climate,
		}
	}

	/// Human-readable label used in logs.
	pub fn label(&self) -> &'static str {
		match self {
			Self::Lock => "LOCK",
			Self::Unlock => "UNLOCK",
			Self::StartEngine(_) => "START ENGINE",
			Self::StopEngine => "STOP ENGINE",
			Self::HornAndLights => "HORN AND LIGHTS",
			Self::Climate(_) => "CLIMATE",
		}
	}

	/// State the presentation layer should show once the command succeeds.
	pub fn resulting_state(&self) -> Vec<StateUpdate> {
		match self {
			Self::Lock => vec![StateUpdate::new(StateField::Locked, true)],
			Self::Unlock => vec![StateUpdate::new(StateField::Locked, false)],
			Self::StartEngine(settings) => vec![
				StateUpdate::new(StateField::EngineRunning, true),
				StateUpdate::new(StateField::ClimateActive, true),
				StateUpdate::new(StateField::TargetTemperature, settings.target_celsius),
			],
			Self::StopEngine => vec![
				StateUpdate::new(StateField::EngineRunning, false),
				StateUpdate::new(StateField::ClimateActive, false),
			],
			Self::HornAndLights => Vec::new(),
			Self::Climate(settings) => vec![
				StateUpdate::new(StateField::ClimateActive, true),
				StateUpdate::new(StateField::TargetTemperature, settings.target_celsius),
			],
		}
	}
}

/// Completion state reported by [`TelematicsBackend::poll_status`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStatus {
	/// `Some(true)` once the vehicle confirmed, `Some(false)` if it refused, `None` while pending.
	pub success: Option<bool>,
	/// Raw backend status string.
	pub status: String,
}
impl CommandStatus {
	/// Command still in flight.
	pub fn pending(status: impl Into<String>) -> Self {
		Self { success: None, status: status.into() }
	}

	/// Command confirmed by the vehicle.
	pub fn succeeded(status: impl Into<String>) -> Self {
		Self { success: Some(true), status: status.into() }
	}

	/// Command refused by the vehicle.
	pub fn failed(status: impl Into<String>) -> Self {
		Self { success: Some(false), status: status.into() }
	}

	/// Returns `true` once the command reached a terminal state.
	pub fn is_terminal(&self) -> bool {
		self.success.is_some()
	}
}

/// Presentation fields the broker updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
	/// Door lock state.
	Locked,
	/// Engine running state.
	EngineRunning,
	/// Climate control state.
	ClimateActive,
	/// Climate target temperature.
	TargetTemperature,
}
impl StateField {
	/// Returns a stable label for the field.
	pub const fn as_str(self) -> &'static str {
		match self {
			StateField::Locked => "locked",
			StateField::EngineRunning => "engine_running",
			StateField::ClimateActive => "climate_active",
			StateField::TargetTemperature => "target_temperature",
		}
	}
}

/// One field/value pair pushed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
	/// Field being updated.
	pub field: StateField,
	/// New value.
	pub value: serde_json::Value,
}
impl StateUpdate {
	/// Creates an update from any JSON-convertible value.
	pub fn new(field: StateField, value: impl Into<serde_json::Value>) -> Self {
		Self { field, value: value.into() }
	}
}

//! Storage contract and built-in implementations for the persisted vehicle inventory.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, backend::ResourceDescriptor};

/// Boxed future returned by [`InventoryStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable cache for the last successfully discovered inventory.
pub trait InventoryStore
where
	Self: Send + Sync,
{
	/// Loads the persisted snapshot, if one exists.
	fn load(&self) -> StoreFuture<'_, Option<InventorySnapshot>>;

	/// Persists or replaces the snapshot.
	fn save(&self, snapshot: InventorySnapshot) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`InventoryStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Non-empty inventory together with the instant it was saved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
	entries: Vec<ResourceDescriptor>,
	#[serde(with = "time::serde::rfc3339")]
	saved_at: OffsetDateTime,
}
impl InventorySnapshot {
	/// Wraps `entries`; returns `None` for an empty inventory, which is never persisted.
	pub fn new(entries: Vec<ResourceDescriptor>, saved_at: OffsetDateTime) -> Option<Self> {
		if entries.is_empty() { None } else { Some(Self { entries, saved_at }) }
	}

	/// Cached descriptors.
	pub fn entries(&self) -> &[ResourceDescriptor] {
		&self.entries
	}

	/// Consumes the snapshot, returning its descriptors.
	pub fn into_entries(self) -> Vec<ResourceDescriptor> {
		self.entries
	}

	/// Instant the snapshot was written.
	pub fn saved_at(&self) -> OffsetDateTime {
		self.saved_at
	}

	/// Drops snapshots that were persisted empty by older writers.
	pub(crate) fn non_empty(self) -> Option<Self> {
		if self.entries.is_empty() { None } else { Some(self) }
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::ResourceId;

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Storage(_)));
		assert!(broker_error.to_string().contains("disk unavailable"));

		let source = StdError::source(&broker_error)
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn empty_inventories_never_form_snapshots() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);

		assert!(InventorySnapshot::new(Vec::new(), now).is_none());

		let id = ResourceId::new("VIN1").expect("VIN fixture should be valid.");
		let snapshot = InventorySnapshot::new(vec![ResourceDescriptor::new(id, "Car")], now)
			.expect("Non-empty inventory should form a snapshot.");

		assert_eq!(snapshot.entries().len(), 1);
		assert_eq!(snapshot.saved_at(), now);
	}

	#[test]
	fn snapshot_serializes_saved_at_as_rfc3339() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);
		let id = ResourceId::new("VIN1").expect("VIN fixture should be valid.");
		let snapshot = InventorySnapshot::new(vec![ResourceDescriptor::new(id, "Car")], now)
			.expect("Non-empty inventory should form a snapshot.");
		let payload = serde_json::to_string(&snapshot).expect("Snapshot should serialize.");

		assert!(payload.contains("\"saved_at\":\"2025-11-10T12:00:00Z\""), "{payload}");
	}
}

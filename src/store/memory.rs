//! Thread-safe in-memory [`InventoryStore`] implementation for local development and tests.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	store::{InventorySnapshot, InventoryStore, StoreFuture},
};

/// Storage backend that keeps the snapshot in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	snapshot: Arc<RwLock<Option<InventorySnapshot>>>,
	saves: Arc<AtomicU64>,
}
impl MemoryStore {
	/// Creates a store pre-seeded with `snapshot`.
	pub fn with_snapshot(snapshot: InventorySnapshot) -> Self {
		Self { snapshot: Arc::new(RwLock::new(Some(snapshot))), saves: Default::default() }
	}

	/// Current snapshot without going through the async contract.
	pub fn current(&self) -> Option<InventorySnapshot> {
		self.snapshot.read().clone()
	}

	/// Number of successful saves.
	pub fn save_count(&self) -> u64 {
		self.saves.load(Ordering::Relaxed)
	}
}
impl InventoryStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<InventorySnapshot>> {
		let snapshot = self.snapshot.read().clone();

		Box::pin(async move { Ok(snapshot) })
	}

	fn save(&self, snapshot: InventorySnapshot) -> StoreFuture<'_, ()> {
		*self.snapshot.write() = Some(snapshot);
		self.saves.fetch_add(1, Ordering::Relaxed);

		Box::pin(async move { Ok(()) })
	}
}

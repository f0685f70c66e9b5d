//! JSON file-backed [`InventoryStore`] for single-host deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::store::{InventorySnapshot, InventoryStore, StoreError, StoreFuture};

/// Persists the inventory snapshot to one JSON file, replacing it atomically on every save.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
}
impl FileStore {
	/// Binds the store to `path`, creating missing parent directories.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		Ok(Self { path })
	}

	/// Location of the cache file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Option<InventorySnapshot>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(None);
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);
		let snapshot: InventorySnapshot =
			serde_path_to_error::deserialize(deserializer).map_err(|e| StoreError::Serialization {
				message: format!(
					"Failed to parse {} at `{}`: {}",
					path.display(),
					e.path(),
					e.inner()
				),
			})?;

		Ok(snapshot.non_empty())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create cache directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, snapshot: &InventorySnapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize inventory snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl InventoryStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<InventorySnapshot>> {
		Box::pin(async move { Self::load_snapshot(&self.path) })
	}

	fn save(&self, snapshot: InventorySnapshot) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.persist(&snapshot) })
	}
}

//! File storage backends
//!
//! The file server persists uploads through the [`FileStorage`] trait.
//! Backends are picked by name from configuration through a
//! [`StorageRegistry`] of constructors.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::FileServerSettings;
use crate::error::{ConfigError, StorageError};
use crate::files::Download;

pub mod fs;

pub use fs::FsFileStorage;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence backend used by the file server
///
/// Operations on different file ids must not interfere. For one file id the
/// last completed `store` wins, and `find_file` never sees a partial write.
#[async_trait]
pub trait FileStorage: Send + Sync {
	/// Persist the bytes held in `source` and return the assigned file id
	async fn store(
		&self,
		source: &Path,
		name: &str,
		user: Option<&str>,
		domain: Option<&str>,
	) -> StorageResult<String>;

	/// Materialize a temporary copy of a stored file; `None` when absent
	async fn find_file(&self, file_id: &str, domain: Option<&str>) -> StorageResult<Option<Download>>;

	/// Remove a stored file; `false` when there was nothing to remove
	async fn delete(&self, file_id: &str, domain: Option<&str>) -> StorageResult<bool>;
}

/// Builds a storage backend from the file server settings
pub type StorageConstructor =
	fn(&FileServerSettings) -> Result<Arc<dyn FileStorage>, ConfigError>;

/// Named storage constructors
pub struct StorageRegistry {
	constructors: HashMap<String, StorageConstructor>,
}

impl StorageRegistry {
	/// Empty registry
	pub fn new() -> Self {
		StorageRegistry { constructors: HashMap::new() }
	}

	/// Registry knowing the built-in `filesystem` backend
	pub fn with_builtin() -> Self {
		let mut registry = StorageRegistry::new();
		registry.register(fs::STORAGE_NAME, fs::construct);
		registry
	}

	pub fn register(&mut self, name: &str, constructor: StorageConstructor) {
		self.constructors.insert(name.to_string(), constructor);
	}

	/// Build the backend registered as `name`
	pub fn build(
		&self,
		name: &str,
		settings: &FileServerSettings,
	) -> Result<Arc<dyn FileStorage>, ConfigError> {
		let constructor = self
			.constructors
			.get(name)
			.ok_or_else(|| ConfigError::UnknownStorage(name.to_string()))?;
		constructor(settings)
	}
}

impl Default for StorageRegistry {
	fn default() -> Self {
		StorageRegistry::with_builtin()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unknown_storage_fails() {
		let registry = StorageRegistry::with_builtin();
		let settings = FileServerSettings::default();
		match registry.build("s3", &settings) {
			Err(ConfigError::UnknownStorage(name)) => assert_eq!(name, "s3"),
			Err(other) => panic!("unexpected error {}", other),
			Ok(_) => panic!("unknown storage must not build"),
		}
	}

	#[test]
	fn test_builtin_filesystem_storage() {
		let dir = tempfile::TempDir::new().unwrap();
		let mut settings = FileServerSettings::default();
		settings.location = dir.path().to_path_buf();
		assert!(StorageRegistry::default().build("filesystem", &settings).is_ok());
	}
}

// vim: ts=4

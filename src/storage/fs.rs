//! Filesystem-backed file storage
//!
//! Layout: `<root>/<domain>/<file id>`. The file id is the sanitized file
//! name, so storing the same name twice replaces the earlier version.
//! Writes go to a hidden temporary file in the domain directory and are
//! renamed into place; downloads copy the stored file into a uniquely named
//! temporary file.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as afs;
use tracing::debug;

use super::{FileStorage, StorageResult};
use crate::config::FileServerSettings;
use crate::error::{ConfigError, StorageError};
use crate::files::{sanitize_file_name, Download, DEFAULT_DOMAIN};

/// Name under which this backend is registered
pub const STORAGE_NAME: &str = "filesystem";

pub(super) fn construct(settings: &FileServerSettings) -> Result<Arc<dyn FileStorage>, ConfigError> {
	let storage = FsFileStorage::new(&settings.location).map_err(|e| {
		ConfigError::Invalid(format!(
			"cannot prepare file storage at {}: {}",
			settings.location.display(),
			e
		))
	})?;
	Ok(Arc::new(storage))
}

/// Stores files below a root directory, one subdirectory per domain
#[derive(Debug, Clone)]
pub struct FsFileStorage {
	root: PathBuf,
	temp_dir: PathBuf,
}

impl FsFileStorage {
	/// Create the root directory if needed; temporary copies go to the OS temp dir
	pub fn new(root: &Path) -> io::Result<Self> {
		std::fs::create_dir_all(root)?;
		Ok(FsFileStorage { root: root.to_path_buf(), temp_dir: std::env::temp_dir() })
	}

	/// Put temporary download copies in `temp_dir` instead
	pub fn with_temp_dir(mut self, temp_dir: &Path) -> Self {
		self.temp_dir = temp_dir.to_path_buf();
		self
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Domain subdirectory; `None` for domains that would leave the root
	fn domain_dir(&self, domain: Option<&str>) -> Option<PathBuf> {
		let domain = domain.filter(|d| !d.is_empty()).unwrap_or(DEFAULT_DOMAIN);
		path_segment(domain).map(|segment| self.root.join(segment))
	}

	/// Map a file id onto a path, refusing ids that would leave the domain dir
	fn file_path(&self, file_id: &str, domain: Option<&str>) -> Option<PathBuf> {
		let name = path_segment(file_id)?;
		Some(self.domain_dir(domain)?.join(name))
	}
}

/// Sanitized single path component; `.` and `..` are not components
fn path_segment(name: &str) -> Option<String> {
	let segment = sanitize_file_name(name);
	if segment.is_empty() || segment == "." || segment == ".." {
		return None;
	}
	Some(segment)
}

#[async_trait]
impl FileStorage for FsFileStorage {
	async fn store(
		&self,
		source: &Path,
		name: &str,
		user: Option<&str>,
		domain: Option<&str>,
	) -> StorageResult<String> {
		let dir = self
			.domain_dir(domain)
			.ok_or_else(|| StorageError::InvalidName(domain.unwrap_or_default().to_string()))?;
		let final_path =
			self.file_path(name, domain).ok_or_else(|| StorageError::InvalidName(name.to_string()))?;
		let file_id = sanitize_file_name(name);
		afs::create_dir_all(&dir).await?;

		let tmp_path = dir.join(format!(".{}.{}.tmp", file_id, uuid::Uuid::new_v4()));
		if let Err(e) = afs::copy(source, &tmp_path).await {
			let _ = afs::remove_file(&tmp_path).await;
			return Err(e.into());
		}
		if let Err(e) = afs::rename(&tmp_path, &final_path).await {
			let _ = afs::remove_file(&tmp_path).await;
			return Err(e.into());
		}

		debug!("Stored {} in {} for user {:?}", file_id, dir.display(), user);
		Ok(file_id)
	}

	async fn find_file(&self, file_id: &str, domain: Option<&str>) -> StorageResult<Option<Download>> {
		let path = match self.file_path(file_id, domain) {
			Some(path) => path,
			None => return Ok(None),
		};

		let temp = tempfile::Builder::new()
			.prefix("cmdlink-download-")
			.tempfile_in(&self.temp_dir)?
			.into_temp_path();
		match afs::copy(&path, &temp).await {
			Ok(_) => {}
			// dropping `temp` removes the empty copy
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		}

		let id = sanitize_file_name(file_id);
		Ok(Some(Download::new(id.clone(), id, domain.map(str::to_string), temp)))
	}

	async fn delete(&self, file_id: &str, domain: Option<&str>) -> StorageResult<bool> {
		let path = match self.file_path(file_id, domain) {
			Some(path) => path,
			None => return Ok(false),
		};
		match afs::remove_file(&path).await {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
			Err(e) => Err(e.into()),
		}
	}
}


// vim: ts=4

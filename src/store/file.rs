//! Simple file-backed [`TokenStore`] that survives process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	store::{CompareAndSwapOutcome, StoreError, StoreFuture, TokenStore},
};

/// Persists the token pair as JSON after each mutation.
///
/// Writes go through a sibling `.tmp` file followed by a rename, so a crash mid-write leaves
/// either the old pair or the new one on disk. A missing or empty file is the logged-out
/// state; [`TokenStore::clear`] removes the file.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Option<TokenPair>>>,
}
impl FileStore {
	/// Opens (or creates the parent directory of) a store at the provided path, eagerly loading
	/// any persisted pair.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<Option<TokenPair>, StoreError> {
		if !path.exists() {
			return Ok(None);
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, pair: &TokenPair) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(pair).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize token pair: {e}"),
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			restrict_permissions(&file, &tmp_path)?;
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

	fn remove_locked(&self) -> Result<(), StoreError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StoreError::Backend {
				message: format!("Failed to remove {}: {e}", self.path.display()),
			}),
		}
	}
}
impl TokenStore for FileStore {
	fn get(&self) -> StoreFuture<'_, Option<TokenPair>> {
		Box::pin(async move { Ok(self.inner.read().clone()) })
	}

	fn set(&self, pair: TokenPair) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			self.persist_locked(&pair)?;
			*guard = Some(pair);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			// The in-memory session ends even when the file cannot be removed.
			guard.take();

			self.remove_locked()
		})
	}

	fn compare_and_swap<'a>(
		&'a self,
		expected_refresh: &'a str,
		replacement: TokenPair,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let outcome = CompareAndSwapOutcome::evaluate(guard.as_ref(), expected_refresh);

			if matches!(outcome, CompareAndSwapOutcome::Updated) {
				self.persist_locked(&replacement)?;
				*guard = Some(replacement);
			}

			Ok(outcome)
		})
	}
}

#[cfg(unix)]
fn restrict_permissions(file: &File, path: &Path) -> Result<(), StoreError> {
	use std::os::unix::fs::PermissionsExt;

	file.set_permissions(fs::Permissions::from_mode(0o600)).map_err(|e| StoreError::Backend {
		message: format!("Failed to restrict permissions on {}: {e}", path.display()),
	})
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File, _path: &Path) -> Result<(), StoreError> {
	Ok(())
}

//! Simple file-backed [`CredentialStore`] for lightweight single-node deployments.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	install::{InstallRecord, Secret, TenantKey},
	store::{CredentialStore, GROUP_NOT_FOUND, StoreError, StoreFuture, memory},
};

/// Persists installation records to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<String, InstallRecord>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = if path.exists() { Self::load_snapshot(&path)? } else { HashMap::new() };

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<String, InstallRecord>, StoreError> {
		let metadata = path.metadata().map_err(|e| StoreError::Read {
			message: format!("failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Read {
			message: format!("failed to read {}: {e}", path.display()),
		})?;
		let records: Vec<InstallRecord> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Read {
				message: format!("failed to parse {}: {e}", path.display()),
			})?;

		Ok(records.into_iter().map(|record| (record.oauth_id.clone(), record)).collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Write {
				message: format!("failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist_locked(&self, contents: &HashMap<String, InstallRecord>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.values().collect();
		let serialized = serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Write {
			message: format!("failed to serialize store snapshot: {e}"),
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Write {
				message: format!("failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Write {
				message: format!("failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Write {
				message: format!("failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Write {
			message: format!("failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn save_credentials(&self, record: InstallRecord) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			memory::check_tenant_constraint(&guard, &record)?;
			guard.insert(record.oauth_id.clone(), record);
			self.persist_locked(&guard)?;

			Ok(())
		})
	}

	fn delete_credentials<'a>(&'a self, oauth_id: &'a str) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if guard.remove(oauth_id).is_some() {
				self.persist_locked(&guard)?;
			}

			Ok(())
		})
	}

	fn credentials(&self, tenant: TenantKey) -> StoreFuture<'_, Option<InstallRecord>> {
		Box::pin(async move {
			Ok(self.inner.read().values().find(|record| record.tenant_key() == tenant).cloned())
		})
	}

	fn group_id(&self, room_id: u64) -> StoreFuture<'_, u64> {
		Box::pin(async move {
			Ok(self
				.inner
				.read()
				.values()
				.find(|record| record.room_id == room_id)
				.map_or(GROUP_NOT_FOUND, |record| record.group_id))
		})
	}

	fn oauth_secret<'a>(&'a self, issuer_id: &'a str) -> StoreFuture<'a, Option<Secret>> {
		Box::pin(async move {
			Ok(self.inner.read().get(issuer_id).map(|record| record.oauth_secret.clone()))
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{
		env, process,
		time::{SystemTime, UNIX_EPOCH},
	};
	// self
	use super::*;
	use crate::_preludet::demo_record;

	fn temp_path() -> PathBuf {
		let nanos = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.expect("System clock should sit after the epoch.")
			.as_nanos();
		let unique = format!("addon_broker_file_store_{}_{nanos}.json", process::id());

		env::temp_dir().join(unique)
	}

	#[tokio::test]
	async fn save_and_reload_round_trip() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let record = demo_record();

		store
			.save_credentials(record.clone())
			.await
			.expect("Failed to save fixture record to file store.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = reopened
			.credentials(record.tenant_key())
			.await
			.expect("Failed to fetch fixture record from file store.")
			.expect("File store lost record after reopen.");

		assert_eq!(fetched, record);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[tokio::test]
	async fn delete_persists_and_stays_idempotent() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");

		store.save_credentials(demo_record()).await.expect("Save should succeed.");
		store.delete_credentials("abc").await.expect("First delete should succeed.");
		store.delete_credentials("abc").await.expect("Second delete should also succeed.");

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");

		assert!(
			reopened
				.credentials(TenantKey::new(1, 0))
				.await
				.expect("Fetch after delete should succeed.")
				.is_none()
		);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}
}

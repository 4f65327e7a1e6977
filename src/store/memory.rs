//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	install::{InstallRecord, Secret, TenantKey},
	store::{CredentialStore, GROUP_NOT_FOUND, StoreError, StoreFuture},
};

type RecordMap = Arc<RwLock<HashMap<String, InstallRecord>>>;

/// Keeps installation records in-process, keyed by OAuth client identifier.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(RecordMap);
impl MemoryStore {
	fn save_now(map: RecordMap, record: InstallRecord) -> Result<(), StoreError> {
		let mut guard = map.write();

		check_tenant_constraint(&guard, &record)?;
		guard.insert(record.oauth_id.clone(), record);

		Ok(())
	}

	fn credentials_now(map: RecordMap, tenant: TenantKey) -> Option<InstallRecord> {
		map.read().values().find(|record| record.tenant_key() == tenant).cloned()
	}

	fn group_now(map: RecordMap, room_id: u64) -> u64 {
		map.read()
			.values()
			.find(|record| record.room_id == room_id)
			.map_or(GROUP_NOT_FOUND, |record| record.group_id)
	}

	fn secret_now(map: RecordMap, issuer_id: &str) -> Option<Secret> {
		map.read().get(issuer_id).map(|record| record.oauth_secret.clone())
	}
}
impl CredentialStore for MemoryStore {
	fn save_credentials(&self, record: InstallRecord) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::save_now(map, record) })
	}

	fn delete_credentials<'a>(&'a self, oauth_id: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(oauth_id);

			Ok(())
		})
	}

	fn credentials(&self, tenant: TenantKey) -> StoreFuture<'_, Option<InstallRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::credentials_now(map, tenant)) })
	}

	fn group_id(&self, room_id: u64) -> StoreFuture<'_, u64> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::group_now(map, room_id)) })
	}

	fn oauth_secret<'a>(&'a self, issuer_id: &'a str) -> StoreFuture<'a, Option<Secret>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::secret_now(map, issuer_id)) })
	}
}

/// Rejects a save whose non-zero `(group, room)` scope is already covered by a
/// different OAuth client. Mirrors the unique compound index a SQL backend
/// would enforce.
pub(crate) fn check_tenant_constraint(
	records: &HashMap<String, InstallRecord>,
	candidate: &InstallRecord,
) -> Result<(), StoreError> {
	let key = candidate.tenant_key();

	if !key.is_group_scoped()
		&& records
			.values()
			.any(|existing| existing.oauth_id != candidate.oauth_id && existing.tenant_key() == key)
	{
		return Err(StoreError::Write {
			message: format!("another installation already covers tenant {key}"),
		});
	}

	Ok(())
}

//! Storage contract and built-in backends for per-tenant installation credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	install::{InstallRecord, Secret, TenantKey},
};

/// Future type returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Sentinel returned by [`CredentialStore::group_id`] when no installation covers
/// the requested room.
///
/// Inherited compatibility edge: the lookup swallows "not found" into this zero
/// value instead of raising an error. Callers must treat it as absence, never as
/// a valid tenant group.
pub const GROUP_NOT_FOUND: u64 = 0;

/// Durable keyed storage contract for per-tenant OAuth credentials.
///
/// Implementations provide their own durability guarantees (transactional
/// writes); the broker never wraps calls in cross-call transactions, so each
/// operation is atomic in isolation only. The logical schema is one table keyed
/// by OAuth client identifier with a unique compound index on
/// `(group_id, room_id)` enforcing one installation per tenant scope.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Inserts or replaces the record stored under its OAuth client identifier.
	///
	/// Replace semantics make re-installs idempotent. Fails with
	/// [`StoreError::Write`] when a different client already covers the same
	/// non-zero `(group, room)` scope, or on connectivity failure. Safe to call
	/// concurrently for distinct identifiers.
	fn save_credentials(&self, record: InstallRecord) -> StoreFuture<'_, ()>;

	/// Removes the record matching the OAuth client identifier.
	///
	/// Deletion is idempotent: removing an absent record is not an error.
	fn delete_credentials<'a>(&'a self, oauth_id: &'a str) -> StoreFuture<'a, ()>;

	/// Fetches the record scoped to the tenant key, if present.
	///
	/// Absence is `None`, not an error; [`StoreError::Read`] is reserved for
	/// backend failure.
	fn credentials(&self, tenant: TenantKey) -> StoreFuture<'_, Option<InstallRecord>>;

	/// Resolves a room to its owning group.
	///
	/// Returns [`GROUP_NOT_FOUND`], not an error, when no installation covers
	/// the room.
	fn group_id(&self, room_id: u64) -> StoreFuture<'_, u64>;

	/// Returns the shared secret associated with an OAuth client identifier,
	/// used exclusively for signed-request verification.
	///
	/// Consulted on every verification so secret rotation takes effect
	/// immediately; the result must not be cached outside the store.
	fn oauth_secret<'a>(&'a self, issuer_id: &'a str) -> StoreFuture<'a, Option<Secret>>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Write-path failure: constraint violation or lost connectivity.
	#[error("Store write failed: {message}.")]
	Write {
		/// Human-readable error payload.
		message: String,
	},
	/// Read-path failure: lost connectivity or a backend fault.
	#[error("Store read failed: {message}.")]
	Read {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn store_error_can_be_serialized() {
		let payload = serde_json::to_string(&StoreError::Read { message: "timeout".into() })
			.expect("StoreError should serialize to JSON.");
		let round_trip: StoreError = serde_json::from_str(&payload)
			.expect("Serialized store error should deserialize from JSON.");

		assert_eq!(round_trip, StoreError::Read { message: "timeout".into() });
	}

	#[test]
	fn group_not_found_is_the_zero_sentinel() {
		assert_eq!(GROUP_NOT_FOUND, 0);
	}
}

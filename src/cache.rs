//! In-memory bearer-token cache owned by the lifecycle controller.

// self
use crate::{
	_prelude::*,
	install::{Secret, TenantKey},
};

#[derive(Clone, Debug)]
struct CacheEntry {
	token: Secret,
	oauth_id: String,
}

/// Concurrent map from tenant key to the most recently exchanged access token.
///
/// The cache is a pure side-effect optimization: losing it only forces a
/// refetch, but an entry must never resolve to another tenant's token. There
/// is no eviction policy—token expiry handling is out of scope—so entries
/// persist until overwritten, invalidated by an uninstall, or process restart.
/// Each [`lifecycle::Integration`](crate::lifecycle::Integration) owns exactly
/// one cache; nothing here is process-global.
#[derive(Debug, Default)]
pub struct TokenCache(RwLock<HashMap<TenantKey, CacheEntry>>);
impl TokenCache {
	/// Returns the cached token for the tenant, if any.
	pub fn get(&self, tenant: &TenantKey) -> Option<Secret> {
		self.0.read().get(tenant).map(|entry| entry.token.clone())
	}

	/// Caches (or overwrites) the tenant's token, tagging the owning client.
	pub fn put(&self, tenant: TenantKey, oauth_id: impl Into<String>, token: Secret) {
		self.0.write().insert(tenant, CacheEntry { token, oauth_id: oauth_id.into() });
	}

	/// Drops every entry issued for the OAuth client identifier.
	///
	/// Uninstall hygiene is best-effort by design: only tokens that were
	/// actually cached carry the owner tag, and those are exactly the entries
	/// that need to disappear.
	pub fn invalidate_client(&self, oauth_id: &str) {
		self.0.write().retain(|_, entry| entry.oauth_id != oauth_id);
	}

	/// Number of live entries.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// True when no tokens are cached.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn put_then_get_returns_the_token() {
		let cache = TokenCache::default();
		let key = TenantKey::new(1, 0);

		cache.put(key, "abc", Secret::new("tok1"));

		assert_eq!(cache.get(&key).expect("Cached token should be present.").expose(), "tok1");
	}

	#[test]
	fn unset_key_misses() {
		let cache = TokenCache::default();

		assert!(cache.get(&TenantKey::new(7, 7)).is_none());
		assert!(cache.is_empty());
	}

	#[test]
	fn put_overwrites_the_previous_token() {
		let cache = TokenCache::default();
		let key = TenantKey::new(1, 5);

		cache.put(key, "abc", Secret::new("stale"));
		cache.put(key, "abc", Secret::new("fresh"));

		assert_eq!(cache.get(&key).expect("Cached token should be present.").expose(), "fresh");
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn invalidation_only_touches_the_named_client() {
		let cache = TokenCache::default();

		cache.put(TenantKey::new(1, 0), "abc", Secret::new("tok-abc"));
		cache.put(TenantKey::new(2, 0), "def", Secret::new("tok-def"));
		cache.invalidate_client("abc");

		assert!(cache.get(&TenantKey::new(1, 0)).is_none());
		assert_eq!(
			cache
				.get(&TenantKey::new(2, 0))
				.expect("Unrelated client's token should survive.")
				.expose(),
			"tok-def",
		);
	}
}

//! Install/update/remove orchestration and per-tenant token acquisition.

// self
use crate::{
	_prelude::*,
	cache::TokenCache,
	exchange::TokenExchanger,
	install::{InstallRecord, Secret, TenantKey},
	obs::{self, LifecycleKind, LifecycleOutcome, LifecycleSpan},
	signed::{SignedParamValidator, SignedParams, SignedParamsError},
	store::{CredentialStore, GROUP_NOT_FOUND},
};

/// Host-registered lifecycle hook.
///
/// Callbacks are fired on detached tasks: no ordering among them, no join, and
/// no completion guarantee at process shutdown.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Coordinates the add-on lifecycle for every tenant installation.
///
/// Owns the token cache (one per instance, never process-global), the
/// credential store and exchanger handles, and the host-registered callbacks.
/// Construct with [`Integration::new`], register callbacks, then share behind
/// [`Arc`]—typically by handing it to [`http::router`](crate::http::router).
///
/// Background work (post-install token acquisition, callback firing) is
/// spawned onto the ambient Tokio runtime, so lifecycle entry points must run
/// inside one.
pub struct Integration {
	store: Arc<dyn CredentialStore>,
	exchanger: Arc<dyn TokenExchanger>,
	cache: TokenCache,
	validator: SignedParamValidator,
	scopes: Vec<String>,
	installation_callbacks: Vec<LifecycleCallback>,
	updated_callbacks: Vec<LifecycleCallback>,
	removed_callbacks: Vec<LifecycleCallback>,
	token_guards: Mutex<HashMap<TenantKey, Arc<AsyncMutex<()>>>>,
}
impl Integration {
	/// Creates an integration over the provided store and exchanger.
	pub fn new(store: Arc<dyn CredentialStore>, exchanger: Arc<dyn TokenExchanger>) -> Self {
		Self {
			validator: SignedParamValidator::new(store.clone()),
			store,
			exchanger,
			cache: TokenCache::default(),
			scopes: Vec::new(),
			installation_callbacks: Vec::new(),
			updated_callbacks: Vec::new(),
			removed_callbacks: Vec::new(),
			token_guards: Default::default(),
		}
	}

	/// Sets the scope list requested during token exchanges (empty by default).
	pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Registers a callback fired after an installation finishes token
	/// acquisition.
	pub fn add_installation_callback(&mut self, callback: impl Fn() + Send + Sync + 'static) {
		self.installation_callbacks.push(Arc::new(callback));
	}

	/// Registers a callback fired when an installation update is acknowledged.
	pub fn add_updated_callback(&mut self, callback: impl Fn() + Send + Sync + 'static) {
		self.updated_callbacks.push(Arc::new(callback));
	}

	/// Registers a callback fired after an installation is removed.
	pub fn add_removed_callback(&mut self, callback: impl Fn() + Send + Sync + 'static) {
		self.removed_callbacks.push(Arc::new(callback));
	}

	/// Read access to this instance's token cache.
	pub fn cache(&self) -> &TokenCache {
		&self.cache
	}

	/// The credential store handle this integration operates over.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Decodes and persists an install webhook payload.
	///
	/// Terminal for the webhook on failure: [`Error::Decode`] for malformed
	/// JSON, [`Error::Store`] when persistence fails. On success the caller
	/// should answer the webhook immediately and hand the returned record to
	/// [`Integration::complete_installation`] on a detached task; the install
	/// is already durable at that point.
	pub async fn on_installed(&self, body: &[u8]) -> Result<InstallRecord> {
		const KIND: LifecycleKind = LifecycleKind::Install;

		let span = LifecycleSpan::new(KIND, "on_installed");

		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

		let result = span
			.instrument(async move {
				let mut deserializer = serde_json::Deserializer::from_slice(body);
				let record: InstallRecord = serde_path_to_error::deserialize(&mut deserializer)
					.map_err(|source| Error::Decode { source })?;

				self.store.save_credentials(record.clone()).await?;

				Ok(record)
			})
			.await;

		match &result {
			Ok(record) => {
				tracing::info!(oauth_id = %record.oauth_id, tenant = %record.tenant_key(), "installation saved");
				obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success);
			},
			Err(_) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure),
		}

		result
	}

	/// Completes an installation in the background: best-effort token
	/// acquisition, then installation callbacks.
	///
	/// Exchange failure is logged and swallowed rather than rolled back—the
	/// credential record is already durable, and a later
	/// [`Integration::token_for_room`] retries the exchange on demand.
	pub async fn complete_installation(&self, record: InstallRecord) {
		match self.acquire_token(&record).await {
			Ok(_) => {
				self.fire_callbacks(&self.installation_callbacks);
			},
			Err(e) => {
				obs::record_lifecycle_outcome(LifecycleKind::Install, LifecycleOutcome::Failure);
				tracing::warn!(
					oauth_id = %record.oauth_id,
					error = %e,
					"token acquisition after install failed",
				);
			},
		}
	}

	/// Handles the uninstall webhook for an OAuth client identifier.
	///
	/// Deletion is idempotent. After a successful delete, cached tokens issued
	/// for the client are dropped (best-effort, by owner tag) and removal
	/// callbacks fire.
	pub async fn on_removed(&self, oauth_id: &str) -> Result<()> {
		const KIND: LifecycleKind = LifecycleKind::Remove;

		let span = LifecycleSpan::new(KIND, "on_removed");

		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

		let result = span
			.instrument(async move {
				self.store.delete_credentials(oauth_id).await?;
				self.cache.invalidate_client(oauth_id);
				self.fire_callbacks(&self.removed_callbacks);

				Ok(())
			})
			.await;

		match &result {
			Ok(()) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success),
			Err(_) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure),
		}

		result
	}

	/// Handles the update webhook.
	///
	/// Acknowledgement plus callbacks only: credentials are intentionally not
	/// re-saved here. A platform update that rotates credentials re-delivers
	/// them through the install webhook.
	pub fn on_updated(&self) {
		obs::record_lifecycle_outcome(LifecycleKind::Update, LifecycleOutcome::Success);
		self.fire_callbacks(&self.updated_callbacks);
	}

	/// Returns a bearer token for the tenant owning `room_id`.
	///
	/// Resolves the owning group, consults the cache, and on a miss performs a
	/// synchronous exchange with the stored credentials. Concurrent cold-cache
	/// callers for one tenant collapse onto a single exchange. Fails with
	/// [`Error::CredentialsNotFound`] when no installation covers the tenant
	/// and [`Error::Exchange`] when the token endpoint rejects the grant.
	pub async fn token_for_room(&self, room_id: u64) -> Result<Secret> {
		const KIND: LifecycleKind = LifecycleKind::TokenLookup;

		let span = LifecycleSpan::new(KIND, "token_for_room");

		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

		let result = span
			.instrument(async move {
				let group_id = self.store.group_id(room_id).await?;

				// The store swallows "no such room" into the zero sentinel.
				if group_id == GROUP_NOT_FOUND {
					return Err(Error::CredentialsNotFound {
						tenant: TenantKey::new(GROUP_NOT_FOUND, room_id),
					});
				}

				let tenant = TenantKey::new(group_id, room_id);
				let guard = self.token_guard(tenant);
				let _singleflight = guard.lock().await;

				if let Some(token) = self.cache.get(&tenant) {
					return Ok(token);
				}

				let record = self
					.store
					.credentials(tenant)
					.await?
					.ok_or(Error::CredentialsNotFound { tenant })?;

				self.acquire_token(&record).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success),
			Err(_) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure),
		}

		result
	}

	/// Verifies an inbound signed request.
	///
	/// The authorization header takes precedence over the `signed_request`
	/// form field; see [`SignedParamValidator::verify_request`].
	pub async fn parse_signed_params(
		&self,
		authorization: Option<&str>,
		signed_request: Option<&str>,
	) -> Result<SignedParams, SignedParamsError> {
		self.validator.verify_request(authorization, signed_request).await
	}

	async fn acquire_token(&self, record: &InstallRecord) -> Result<Secret> {
		let token = self
			.exchanger
			.exchange(&record.oauth_id, &record.oauth_secret, &self.scopes)
			.await?;

		self.cache.put(record.tenant_key(), record.oauth_id.clone(), token.clone());

		Ok(token)
	}

	fn token_guard(&self, tenant: TenantKey) -> Arc<AsyncMutex<()>> {
		self.token_guards.lock().entry(tenant).or_default().clone()
	}

	fn fire_callbacks(&self, callbacks: &[LifecycleCallback]) {
		for callback in callbacks {
			let callback = callback.clone();

			tokio::spawn(async move { callback() });
		}
	}
}
impl Debug for Integration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Integration")
			.field("scopes", &self.scopes)
			.field("cached_tokens", &self.cache.len())
			.finish()
	}
}

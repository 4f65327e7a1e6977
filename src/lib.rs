//! Server-side add-on broker for a chat platform—lifecycle webhooks, per-tenant OAuth
//! credentials, cached bearer tokens, and signed-request verification in one crate.
//!
//! The broker receives install/update/uninstall webhooks from the platform, persists
//! each tenant's OAuth client credentials through a pluggable [`store::CredentialStore`],
//! exchanges them for bearer tokens via a [`exchange::TokenExchanger`], caches those
//! tokens per tenant, and verifies inbound JWT-signed requests with per-issuer secrets.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod error;
pub mod exchange;
pub mod http;
pub mod install;
pub mod lifecycle;
pub mod obs;
pub mod signed;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and test doubles for unit and integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		exchange::{ExchangeError, ExchangeFuture, TokenExchanger},
		install::{InstallRecord, Secret},
		lifecycle::Integration,
		store::MemoryStore,
	};

	/// Arguments captured from one [`StaticExchanger`] invocation.
	#[derive(Clone, Debug, PartialEq, Eq)]
	pub struct ExchangeCall {
		/// OAuth client identifier handed to the exchanger.
		pub client_id: String,
		/// Client secret handed to the exchanger.
		pub client_secret: String,
		/// Requested scope list.
		pub scopes: Vec<String>,
	}

	/// Exchanger stub that returns a fixed token while recording invocations.
	#[derive(Debug)]
	pub struct StaticExchanger {
		token: String,
		calls: Mutex<Vec<ExchangeCall>>,
	}
	impl StaticExchanger {
		/// Creates a stub that always yields `token`.
		pub fn new(token: impl Into<String>) -> Arc<Self> {
			Arc::new(Self { token: token.into(), calls: Mutex::new(Vec::new()) })
		}

		/// Number of exchanges performed so far.
		pub fn calls(&self) -> usize {
			self.calls.lock().len()
		}

		/// Every exchange observed so far, in call order.
		pub fn recorded(&self) -> Vec<ExchangeCall> {
			self.calls.lock().clone()
		}
	}
	impl TokenExchanger for StaticExchanger {
		fn exchange<'a>(
			&'a self,
			client_id: &'a str,
			client_secret: &'a Secret,
			scopes: &'a [String],
		) -> ExchangeFuture<'a, Secret> {
			Box::pin(async move {
				self.calls.lock().push(ExchangeCall {
					client_id: client_id.to_owned(),
					client_secret: client_secret.expose().to_owned(),
					scopes: scopes.to_vec(),
				});

				Ok(Secret::new(self.token.clone()))
			})
		}
	}

	/// Exchanger stub that rejects every exchange.
	#[derive(Debug, Default)]
	pub struct FailingExchanger;
	impl TokenExchanger for FailingExchanger {
		fn exchange<'a>(
			&'a self,
			_client_id: &'a str,
			_client_secret: &'a Secret,
			_scopes: &'a [String],
		) -> ExchangeFuture<'a, Secret> {
			Box::pin(async move {
				Err(ExchangeError::Endpoint { message: "stub rejection".into() })
			})
		}
	}

	/// Builds an [`Integration`] over a fresh in-memory store and the provided exchanger.
	pub fn build_test_integration(
		exchanger: Arc<dyn TokenExchanger>,
	) -> (Arc<Integration>, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let integration = Integration::new(store.clone(), exchanger);

		(Arc::new(integration), store)
	}

	/// Install payload fixture shared by lifecycle tests.
	pub fn demo_record() -> InstallRecord {
		InstallRecord {
			capabilities_url: Url::parse("https://chat.example.test/v2/capabilities")
				.expect("Fixture capabilities URL should parse successfully."),
			oauth_id: "abc".into(),
			oauth_secret: Secret::new("s3cr3t"),
			group_id: 1,
			room_id: 0,
		}
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {httpmock as _, tower as _};

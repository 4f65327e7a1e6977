//! Broker-level error types shared across the controller, validator, and stores.

// self
use crate::{_prelude::*, install::TenantKey};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Webhook payload could not be decoded.
	#[error("Webhook payload could not be decoded at `{}`.", .source.path())]
	Decode {
		/// Structured decoding failure naming the offending field.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Persistence-layer failure.
	#[error("{0}")]
	Store(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Token exchange against the platform failed.
	#[error(transparent)]
	Exchange(#[from] crate::exchange::ExchangeError),
	/// No installation record exists for the resolved tenant.
	#[error("No credentials are installed for tenant {tenant}.")]
	CredentialsNotFound {
		/// Tenant scope that failed to resolve.
		tenant: TenantKey,
	},
	/// Signed-request verification failed.
	#[error(transparent)]
	SignedParams(#[from] crate::signed::SignedParamsError),
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_broker_error_with_source() {
		let store_error = StoreError::Write { message: "database unreachable".into() };
		let broker_error: Error = store_error.clone().into();

		assert!(matches!(broker_error, Error::Store(_)));
		assert!(broker_error.to_string().contains("database unreachable"));

		let source = StdError::source(&broker_error)
			.expect("Broker error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn decode_error_names_the_offending_field() {
		let mut deserializer = serde_json::Deserializer::from_str(
			r#"{"capabilitiesUrl":"https://x.test","oauthId":"abc","oauthSecret":"s","groupId":"not-a-number"}"#,
		);
		let source =
			serde_path_to_error::deserialize::<_, crate::install::InstallRecord>(&mut deserializer)
				.expect_err("Mistyped group identifier should fail to decode.");
		let error = Error::Decode { source };

		assert!(error.to_string().contains("groupId"));
	}
}

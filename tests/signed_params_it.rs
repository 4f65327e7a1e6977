// std
use std::sync::Arc;
// crates.io
use jsonwebtoken::{EncodingKey, Header};
// self
use addon_broker::{
	exchange::{ExchangeFuture, TokenExchanger},
	install::Secret,
	lifecycle::Integration,
	signed::{SignedParams, SignedParamsError},
	store::{CredentialStore, MemoryStore},
};

#[derive(Debug)]
struct UnusedExchanger;
impl TokenExchanger for UnusedExchanger {
	fn exchange<'a>(
		&'a self,
		_client_id: &'a str,
		_client_secret: &'a Secret,
		_scopes: &'a [String],
	) -> ExchangeFuture<'a, Secret> {
		Box::pin(async { Ok(Secret::new("unused")) })
	}
}

fn install_payload(secret: &str) -> String {
	format!(
		"{{\"capabilitiesUrl\":\"https://chat.example.test/v2/capabilities\",\
		\"oauthId\":\"abc\",\"oauthSecret\":\"{secret}\",\"groupId\":1,\"roomId\":0}}",
	)
}

fn sign(secret: &str) -> String {
	let claims = serde_json::json!({
		"iss": "abc",
		"context": { "room_id": 42, "user_tz": "UTC" },
	});

	jsonwebtoken::encode(
		&Header::default(),
		&claims,
		&EncodingKey::from_secret(secret.as_bytes()),
	)
	.expect("Test token should encode.")
}

async fn build_integration() -> (Arc<Integration>, Arc<MemoryStore>) {
	let store = Arc::new(MemoryStore::default());
	let integration = Arc::new(Integration::new(store.clone(), Arc::new(UnusedExchanger)));

	integration
		.on_installed(install_payload("s3cr3t").as_bytes())
		.await
		.expect("Install payload should persist.");

	(integration, store)
}

#[tokio::test]
async fn header_token_verifies_and_yields_the_exact_claims() {
	let (integration, _store) = build_integration().await;
	let header = format!("JWT {}", sign("s3cr3t"));
	let params = integration
		.parse_signed_params(Some(&header), None)
		.await
		.expect("Correctly signed header token should verify.");

	assert_eq!(params, SignedParams { room_id: 42, user_timezone: "UTC".into() });
}

#[tokio::test]
async fn verification_tracks_secret_rotation_in_the_store() {
	let (integration, store) = build_integration().await;
	let stale_token = sign("s3cr3t");

	// Re-install with a rotated secret; the validator re-queries the store on
	// every verification, so the old signature dies immediately.
	store
		.save_credentials(
			serde_json::from_str(&install_payload("rotated"))
				.expect("Rotated install payload should deserialize."),
		)
		.await
		.expect("Rotated re-install should replace the record.");

	let err = integration
		.parse_signed_params(None, Some(&stale_token))
		.await
		.expect_err("Token signed with the pre-rotation secret must be rejected.");

	assert!(matches!(err, SignedParamsError::InvalidSignature));

	let params = integration
		.parse_signed_params(None, Some(&sign("rotated")))
		.await
		.expect("Token signed with the rotated secret should verify.");

	assert_eq!(params.room_id, 42);
}

#[tokio::test]
async fn uninstalled_issuer_is_rejected() {
	let (integration, _store) = build_integration().await;

	integration.on_removed("abc").await.expect("Uninstall should succeed.");

	let err = integration
		.parse_signed_params(None, Some(&sign("s3cr3t")))
		.await
		.expect_err("Tokens from an uninstalled issuer must be rejected.");

	assert!(matches!(err, SignedParamsError::UnknownIssuer { ref issuer } if issuer == "abc"));
}

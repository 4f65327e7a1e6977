//! Signed-request (JWT) verification using per-issuer secrets.
//!
//! The platform signs requests with the OAuth client secret of the issuing
//! installation. Verification therefore runs store-first: peek the unverified
//! `iss` claim, look up that client's secret, then verify the signature with
//! the HMAC family pinned—any other signing algorithm is rejected outright to
//! rule out downgrade/confusion attacks. Expiry claims are not validated here;
//! only the signature and the claim shape are checked.

// std
use std::collections::HashSet;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
// self
use crate::{
	_prelude::*,
	install::Secret,
	store::{CredentialStore, StoreError},
};

const JWT_SCHEME: &str = "JWT ";
const HMAC_ALGORITHMS: &[Algorithm] = &[Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Verified request context asserted by the platform.
///
/// Only ever produced by successful verification; there is no constructor from
/// unverified input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedParams {
	/// Room the request originated from.
	pub room_id: u32,
	/// IANA timezone of the acting user.
	pub user_timezone: String,
}

/// Error type produced by signed-request verification.
#[derive(Debug, ThisError)]
pub enum SignedParamsError {
	/// Neither the authorization header nor the form field carried a token.
	#[error("Request carries no signed request.")]
	NoSignedRequest,
	/// Token structure or claims could not be parsed.
	#[error("Signed request is malformed: {reason}.")]
	MalformedToken {
		/// What failed to parse.
		reason: String,
	},
	/// The issuer claim does not match any installed OAuth client.
	#[error("Signed request names unknown issuer `{issuer}`.")]
	UnknownIssuer {
		/// Issuer string taken from the unverified `iss` claim.
		issuer: String,
	},
	/// Signature mismatch, or a signing algorithm outside the HMAC family.
	#[error("Signed request signature is invalid.")]
	InvalidSignature,
	/// A context claim was missing or mistyped.
	#[error("Signed request claim `{field}` is missing or mistyped.")]
	ClaimExtraction {
		/// Name of the offending claim field.
		field: &'static str,
	},
	/// Secret lookup failed in the credential store.
	#[error("{0}")]
	Store(
		#[from]
		#[source]
		StoreError,
	),
}

/// Verifies inbound signed requests against per-issuer secrets from the store.
///
/// The secret is re-queried on every verification so rotation in the store
/// takes effect immediately.
pub struct SignedParamValidator {
	store: Arc<dyn CredentialStore>,
}
impl SignedParamValidator {
	/// Creates a validator backed by the provided store.
	pub fn new(store: Arc<dyn CredentialStore>) -> Self {
		Self { store }
	}

	/// Extracts and verifies a token from request inputs.
	///
	/// The `Authorization: JWT <token>` header (case-insensitive scheme) takes
	/// precedence over the `signed_request` form field; when neither carries a
	/// token the request is rejected with
	/// [`SignedParamsError::NoSignedRequest`].
	pub async fn verify_request(
		&self,
		authorization: Option<&str>,
		signed_request: Option<&str>,
	) -> Result<SignedParams, SignedParamsError> {
		if let Some(header) = authorization
			&& let Some(token) = strip_jwt_scheme(header)
		{
			return self.verify_compact(token).await;
		}
		if let Some(token) = signed_request.filter(|value| !value.is_empty()) {
			return self.verify_compact(token).await;
		}

		Err(SignedParamsError::NoSignedRequest)
	}

	/// Verifies a compact JWT and extracts its signed parameters.
	pub async fn verify_compact(&self, token: &str) -> Result<SignedParams, SignedParamsError> {
		let issuer = peek_issuer(token)?;
		let secret = self
			.store
			.oauth_secret(&issuer)
			.await?
			.ok_or(SignedParamsError::UnknownIssuer { issuer })?;

		decode_verified(token, &secret)
	}
}
impl Debug for SignedParamValidator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SignedParamValidator(..)")
	}
}

fn strip_jwt_scheme(header: &str) -> Option<&str> {
	let trimmed = header.trim_start();
	let scheme = trimmed.get(..JWT_SCHEME.len())?;

	scheme
		.eq_ignore_ascii_case(JWT_SCHEME)
		.then(|| trimmed[JWT_SCHEME.len()..].trim())
		.filter(|token| !token.is_empty())
}

/// Reads `iss` from the claims segment without verifying the signature. The
/// issuer is only trusted as a lookup key; nothing else is used until the
/// signature checks out.
fn peek_issuer(token: &str) -> Result<String, SignedParamsError> {
	let payload =
		token.split('.').nth(1).ok_or_else(|| malformed("token is not a compact JWS"))?;
	let bytes = URL_SAFE_NO_PAD
		.decode(payload)
		.map_err(|_| malformed("claims segment is not base64url"))?;
	let claims: serde_json::Value =
		serde_json::from_slice(&bytes).map_err(|_| malformed("claims segment is not JSON"))?;

	match claims.get("iss") {
		Some(serde_json::Value::String(issuer)) => Ok(issuer.clone()),
		Some(_) => Err(malformed("`iss` claim is not a string")),
		None => Err(malformed("`iss` claim is missing")),
	}
}

#[derive(Deserialize)]
struct RawClaims {
	#[serde(default)]
	context: Option<serde_json::Value>,
}

fn decode_verified(token: &str, secret: &Secret) -> Result<SignedParams, SignedParamsError> {
	let header =
		jsonwebtoken::decode_header(token).map_err(|e| malformed(&e.to_string()))?;

	if !HMAC_ALGORITHMS.contains(&header.alg) {
		return Err(SignedParamsError::InvalidSignature);
	}

	let mut validation = Validation::new(header.alg);

	validation.validate_exp = false;
	validation.validate_aud = false;
	validation.required_spec_claims = HashSet::new();

	let key = DecodingKey::from_secret(secret.expose().as_bytes());
	let data =
		jsonwebtoken::decode::<RawClaims>(token, &key, &validation).map_err(|e| match e.kind() {
			ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm =>
				SignedParamsError::InvalidSignature,
			_ => malformed(&e.to_string()),
		})?;

	extract_params(data.claims)
}

/// Typed extraction of the nested `context` claim: numeric coercion for
/// `room_id`, strict string for `user_tz`, each failure naming its field.
fn extract_params(claims: RawClaims) -> Result<SignedParams, SignedParamsError> {
	let context = claims
		.context
		.as_ref()
		.and_then(serde_json::Value::as_object)
		.ok_or(SignedParamsError::ClaimExtraction { field: "context" })?;
	let room_id = context
		.get("room_id")
		.and_then(coerce_room_id)
		.ok_or(SignedParamsError::ClaimExtraction { field: "room_id" })?;
	let user_timezone = match context.get("user_tz") {
		Some(serde_json::Value::String(tz)) => tz.clone(),
		_ => return Err(SignedParamsError::ClaimExtraction { field: "user_tz" }),
	};

	Ok(SignedParams { room_id, user_timezone })
}

fn coerce_room_id(value: &serde_json::Value) -> Option<u32> {
	let wide = value.as_u64().or_else(|| {
		value.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)
	})?;

	u32::try_from(wide).ok()
}

fn malformed(reason: &str) -> SignedParamsError {
	SignedParamsError::MalformedToken { reason: reason.to_owned() }
}

#[cfg(test)]
mod tests {
	// crates.io
	use jsonwebtoken::{EncodingKey, Header};
	// self
	use super::*;
	use crate::{_preludet::demo_record, store::MemoryStore};

	fn sign(claims: &serde_json::Value, secret: &str) -> String {
		jsonwebtoken::encode(
			&Header::default(),
			claims,
			&EncodingKey::from_secret(secret.as_bytes()),
		)
		.expect("Test token should encode.")
	}

	fn platform_claims() -> serde_json::Value {
		serde_json::json!({
			"iss": "abc",
			"context": { "room_id": 42, "user_tz": "UTC" },
		})
	}

	async fn installed_validator() -> SignedParamValidator {
		let store = Arc::new(MemoryStore::default());

		store
			.save_credentials(demo_record())
			.await
			.expect("Fixture installation should save.");

		SignedParamValidator::new(store)
	}

	#[tokio::test]
	async fn matching_secret_yields_the_exact_claims() {
		let validator = installed_validator().await;
		let token = sign(&platform_claims(), "s3cr3t");
		let params = validator
			.verify_compact(&token)
			.await
			.expect("Correctly signed token should verify.");

		assert_eq!(params, SignedParams { room_id: 42, user_timezone: "UTC".into() });
	}

	#[tokio::test]
	async fn wrong_secret_is_an_invalid_signature() {
		let validator = installed_validator().await;
		let token = sign(&platform_claims(), "the-wrong-secret");
		let err = validator
			.verify_compact(&token)
			.await
			.expect_err("Token signed with another secret must be rejected.");

		assert!(matches!(err, SignedParamsError::InvalidSignature));
	}

	#[tokio::test]
	async fn non_hmac_algorithm_is_always_rejected() {
		let validator = installed_validator().await;
		// Hand-built RS256 token; the signature bytes never matter because the
		// algorithm check runs first.
		let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#);
		let payload = URL_SAFE_NO_PAD.encode(platform_claims().to_string());
		let token = format!("{header}.{payload}.AAAA");
		let err = validator
			.verify_compact(&token)
			.await
			.expect_err("Non-HMAC algorithms must be rejected.");

		assert!(matches!(err, SignedParamsError::InvalidSignature));
	}

	#[tokio::test]
	async fn unknown_issuer_is_named() {
		let validator = SignedParamValidator::new(Arc::new(MemoryStore::default()));
		let token = sign(&platform_claims(), "s3cr3t");
		let err = validator
			.verify_compact(&token)
			.await
			.expect_err("Issuer with no installation must be rejected.");

		assert!(matches!(err, SignedParamsError::UnknownIssuer { ref issuer } if issuer == "abc"));
	}

	#[tokio::test]
	async fn missing_issuer_is_malformed() {
		let validator = installed_validator().await;
		let token = sign(&serde_json::json!({"context": {}}), "s3cr3t");
		let err = validator
			.verify_compact(&token)
			.await
			.expect_err("Token without `iss` must be rejected.");

		assert!(matches!(err, SignedParamsError::MalformedToken { .. }));
	}

	#[tokio::test]
	async fn mistyped_timezone_names_the_field() {
		let validator = installed_validator().await;
		let claims = serde_json::json!({
			"iss": "abc",
			"context": { "room_id": 42, "user_tz": 7 },
		});
		let err = validator
			.verify_compact(&sign(&claims, "s3cr3t"))
			.await
			.expect_err("Numeric user_tz must be rejected.");

		assert!(matches!(err, SignedParamsError::ClaimExtraction { field: "user_tz" }));
	}

	#[tokio::test]
	async fn missing_room_names_the_field() {
		let validator = installed_validator().await;
		let claims = serde_json::json!({
			"iss": "abc",
			"context": { "user_tz": "UTC" },
		});
		let err = validator
			.verify_compact(&sign(&claims, "s3cr3t"))
			.await
			.expect_err("Missing room_id must be rejected.");

		assert!(matches!(err, SignedParamsError::ClaimExtraction { field: "room_id" }));
	}

	#[tokio::test]
	async fn header_scheme_is_case_insensitive_and_preferred() {
		let validator = installed_validator().await;
		let token = sign(&platform_claims(), "s3cr3t");
		let header = format!("jwt {token}");
		let params = validator
			.verify_request(Some(&header), Some("not-even-a-token"))
			.await
			.expect("Header token should win over the form field.");

		assert_eq!(params.room_id, 42);
	}

	#[tokio::test]
	async fn form_field_is_the_fallback() {
		let validator = installed_validator().await;
		let token = sign(&platform_claims(), "s3cr3t");
		let params = validator
			.verify_request(None, Some(&token))
			.await
			.expect("Form-delivered token should verify.");

		assert_eq!(params.user_timezone, "UTC");
	}

	#[tokio::test]
	async fn absent_inputs_are_rejected() {
		let validator = installed_validator().await;
		let err = validator
			.verify_request(Some("Bearer abc"), None)
			.await
			.expect_err("Non-JWT authorization scheme alone must be rejected.");

		assert!(matches!(err, SignedParamsError::NoSignedRequest));
	}

	#[test]
	fn float_room_identifiers_coerce() {
		assert_eq!(coerce_room_id(&serde_json::json!(42.0)), Some(42));
		assert_eq!(coerce_room_id(&serde_json::json!(42.5)), None);
		assert_eq!(coerce_room_id(&serde_json::json!(-1)), None);
		assert_eq!(coerce_room_id(&serde_json::json!(u64::from(u32::MAX) + 1)), None);
	}
}

//! Webhook surface and signed-request extraction for the add-on endpoints.
//!
//! The router is deliberately thin: decode, delegate to
//! [`Integration`](crate::lifecycle::Integration), map errors to plaintext
//! responses. Hosts mount it into their own server alongside whatever other
//! routes the add-on serves.

// crates.io
use axum::{
	Router,
	body::Bytes,
	extract::{FromRequest, Path, RawForm, Request, State},
	http::{Method, StatusCode, Uri, header::AUTHORIZATION},
	response::{IntoResponse, Response},
	routing::any,
};
// self
use crate::{
	_prelude::*,
	lifecycle::Integration,
	signed::{SignedParams, SignedParamsError},
};

/// Builds the webhook router for the integration.
///
/// Routes: `POST /installed`, `DELETE /installed/{oauth_id}`, and `/updated`
/// under any method. Other methods on the `/installed` paths answer 405 with a
/// plaintext body naming the method and path.
pub fn router(integration: Arc<Integration>) -> Router {
	Router::new()
		.route("/installed", any(handle_installed))
		.route("/installed/{oauth_id}", any(handle_removed))
		.route("/updated", any(handle_updated))
		.with_state(integration)
}

async fn handle_installed(
	State(integration): State<Arc<Integration>>,
	method: Method,
	uri: Uri,
	body: Bytes,
) -> Response {
	if method != Method::POST {
		return method_not_allowed(&method, &uri);
	}

	match integration.on_installed(&body).await {
		Ok(record) => {
			let completing = integration.clone();

			// The webhook response must not wait on token acquisition.
			tokio::spawn(async move { completing.complete_installation(record).await });

			(StatusCode::OK, "OK").into_response()
		},
		Err(error @ Error::Decode { .. }) => {
			tracing::error!(%error, "failed to deserialize installation data");

			(StatusCode::INTERNAL_SERVER_ERROR, "There was an error deserializing the data.")
				.into_response()
		},
		Err(error) => {
			tracing::error!(%error, "failed to save installation credentials");

			(StatusCode::INTERNAL_SERVER_ERROR, "There was an error saving these credentials.")
				.into_response()
		},
	}
}

async fn handle_removed(
	State(integration): State<Arc<Integration>>,
	method: Method,
	uri: Uri,
	Path(oauth_id): Path<String>,
) -> Response {
	if method != Method::DELETE {
		return method_not_allowed(&method, &uri);
	}

	match integration.on_removed(&oauth_id).await {
		Ok(()) => (StatusCode::OK, "OK").into_response(),
		Err(error) => {
			tracing::error!(%oauth_id, %error, "failed to delete installation credentials");

			(StatusCode::INTERNAL_SERVER_ERROR, "There was an error deleting these credentials.")
				.into_response()
		},
	}
}

async fn handle_updated(State(integration): State<Arc<Integration>>, uri: Uri) -> Response {
	integration.on_updated();

	(StatusCode::OK, format!("Acknowledged {}", uri.path())).into_response()
}

fn method_not_allowed(method: &Method, uri: &Uri) -> Response {
	(StatusCode::METHOD_NOT_ALLOWED, format!("Method {method} not supported at {}", uri.path()))
		.into_response()
}

/// Extractor yielding verified [`SignedParams`] to downstream handlers.
///
/// Reads the `Authorization: JWT <token>` header first, then the
/// `signed_request` form field, and runs full verification against the
/// integration's store. Verification failures reject with 401 (bad signature,
/// unknown issuer), 400 (missing or malformed input), or 500 (store failure),
/// each with a plaintext body.
#[derive(Clone, Debug)]
pub struct SignedContext(pub SignedParams);
impl FromRequest<Arc<Integration>> for SignedContext {
	type Rejection = Response;

	async fn from_request(
		req: Request,
		state: &Arc<Integration>,
	) -> Result<Self, Self::Rejection> {
		let authorization = req
			.headers()
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);
		// A request authenticated via the header may carry any body shape, so a
		// form-extraction rejection is treated as "no form token" rather than
		// surfaced.
		let signed_request = match RawForm::from_request(req, state).await {
			Ok(RawForm(form)) => url::form_urlencoded::parse(&form)
				.find(|(key, _)| key == "signed_request")
				.map(|(_, value)| value.into_owned()),
			Err(_) => None,
		};
		let params = state
			.parse_signed_params(authorization.as_deref(), signed_request.as_deref())
			.await
			.map_err(reject_signed)?;

		Ok(Self(params))
	}
}

fn reject_signed(error: SignedParamsError) -> Response {
	let status = match &error {
		SignedParamsError::NoSignedRequest
		| SignedParamsError::MalformedToken { .. }
		| SignedParamsError::ClaimExtraction { .. } => StatusCode::BAD_REQUEST,
		SignedParamsError::UnknownIssuer { .. } | SignedParamsError::InvalidSignature =>
			StatusCode::UNAUTHORIZED,
		SignedParamsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
	};

	(status, error.to_string()).into_response()
}

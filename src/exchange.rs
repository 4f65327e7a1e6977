//! Client-credentials token exchange against the platform.
//!
//! The broker treats the exchange as a black-box RPC: hand over the client
//! identifier/secret pair plus a scope list, receive a bearer token or an
//! error. [`PlatformTokenExchanger`] is the default reqwest-backed
//! implementation; hosts with custom transports implement [`TokenExchanger`]
//! directly.

// crates.io
use oauth2::{
	HttpClientError, RequestTokenError,
	basic::BasicRequestTokenError,
};
#[cfg(feature = "reqwest")]
use oauth2::{
	AsyncHttpClient, ClientId, ClientSecret, HttpRequest, HttpResponse, Scope, TokenResponse,
	TokenUrl, basic::BasicClient,
};
// self
use crate::{_prelude::*, install::Secret};

/// Future type returned by [`TokenExchanger::exchange`].
pub type ExchangeFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, ExchangeError>> + 'a + Send>>;

/// Outbound client-credentials exchange contract.
///
/// One async operation with no retry policy: failures surface to the caller
/// untouched. No timeout is imposed either; an implementation targeting
/// production should bound its transport explicitly.
pub trait TokenExchanger
where
	Self: Send + Sync,
{
	/// Trades the client identifier/secret pair for a bearer access token.
	fn exchange<'a>(
		&'a self,
		client_id: &'a str,
		client_secret: &'a Secret,
		scopes: &'a [String],
	) -> ExchangeFuture<'a, Secret>;
}

/// Error type produced by [`TokenExchanger`] implementations.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Token endpoint rejected the grant or answered unexpectedly.
	#[error("Token endpoint rejected the exchange: {message}.")]
	Endpoint {
		/// Provider- or broker-supplied reason string.
		message: String,
	},
	/// Token endpoint answered with a payload that could not be parsed.
	#[error("Token endpoint returned a malformed response: {message}.")]
	Response {
		/// Human-readable parse failure.
		message: String,
	},
	/// Transport failure (DNS, TCP, TLS) before any response arrived.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific failure.
		#[source]
		source: Box<dyn StdError + Send + Sync>,
	},
}
impl ExchangeError {
	/// Wraps a transport-specific failure.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Classifies an `oauth2` token-request failure into the exchange taxonomy.
	pub fn from_token_error<E>(err: BasicRequestTokenError<HttpClientError<E>>) -> Self
	where
		E: 'static + Send + Sync + StdError,
	{
		match err {
			RequestTokenError::ServerResponse(response) => {
				let message = response
					.error_description()
					.cloned()
					.unwrap_or_else(|| response.error().as_ref().to_owned());

				Self::Endpoint { message }
			},
			RequestTokenError::Request(error) => match error {
				HttpClientError::Reqwest(inner) => Self::Network { source: inner },
				HttpClientError::Http(inner) => Self::network(inner),
				HttpClientError::Io(inner) => Self::network(inner),
				HttpClientError::Other(message) => Self::Endpoint { message },
				_ => Self::Endpoint { message: "unclassified transport failure".into() },
			},
			RequestTokenError::Parse(error, _body) =>
				Self::Response { message: error.to_string() },
			RequestTokenError::Other(message) => Self::Endpoint { message },
		}
	}
}

/// Platform capabilities document subset consumed by the broker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Capabilities {
	/// OAuth provider metadata advertised by the platform.
	#[serde(rename = "oauth2Provider")]
	pub oauth2_provider: OAuth2Provider,
}

/// OAuth endpoints advertised in the capabilities document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Provider {
	/// Authorization endpoint; unused by the client-credentials grant.
	pub authorization_url: Url,
	/// Token endpoint used for exchanges.
	pub token_url: Url,
}

#[cfg(feature = "reqwest")]
/// Reqwest-backed transport handle satisfying the `oauth2` client contract.
///
/// Token requests must not follow redirects, matching OAuth 2.0 guidance that
/// token endpoints return results directly. Configure any custom
/// [`ReqwestClient`] accordingly before wrapping it.
#[derive(Clone, Debug, Default)]
pub struct ExchangeTransport(ReqwestClient);
#[cfg(feature = "reqwest")]
impl ExchangeTransport {
	/// Wraps an existing reqwest client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for ExchangeTransport {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let client = self.0.clone();

		Box::pin(async move {
			let response =
				client.execute(request.try_into().map_err(Box::new)?).await.map_err(Box::new)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut response_new =
				HttpResponse::new(response.bytes().await.map_err(Box::new)?.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;

			Ok(response_new)
		})
	}
}

#[cfg(feature = "reqwest")]
/// Default [`TokenExchanger`] performing the grant against a fixed token endpoint.
#[derive(Clone, Debug)]
pub struct PlatformTokenExchanger {
	token_url: Url,
	transport: ExchangeTransport,
}
#[cfg(feature = "reqwest")]
impl PlatformTokenExchanger {
	/// Creates an exchanger bound to the platform token endpoint.
	pub fn new(token_url: Url) -> Self {
		Self { token_url, transport: ExchangeTransport::default() }
	}

	/// Replaces the transport with a caller-provided reqwest wrapper.
	pub fn with_transport(mut self, transport: ExchangeTransport) -> Self {
		self.transport = transport;

		self
	}

	/// Resolves the token endpoint from an installation's capabilities document
	/// and returns an exchanger bound to it.
	pub async fn discover(capabilities_url: &Url) -> Result<Self, ExchangeError> {
		let transport = ExchangeTransport::default();
		let capabilities = fetch_capabilities(&transport.0, capabilities_url).await?;

		Ok(Self { token_url: capabilities.oauth2_provider.token_url, transport })
	}
}
#[cfg(feature = "reqwest")]
impl TokenExchanger for PlatformTokenExchanger {
	fn exchange<'a>(
		&'a self,
		client_id: &'a str,
		client_secret: &'a Secret,
		scopes: &'a [String],
	) -> ExchangeFuture<'a, Secret> {
		Box::pin(async move {
			let client = BasicClient::new(ClientId::new(client_id.to_owned()))
				.set_client_secret(ClientSecret::new(client_secret.expose().to_owned()))
				.set_token_uri(TokenUrl::from_url(self.token_url.clone()));
			let mut request = client.exchange_client_credentials();

			for scope in scopes {
				request = request.add_scope(Scope::new(scope.clone()));
			}

			let response = request
				.request_async(&self.transport)
				.await
				.map_err(ExchangeError::from_token_error)?;

			Ok(Secret::new(response.access_token().secret().as_str()))
		})
	}
}

#[cfg(feature = "reqwest")]
async fn fetch_capabilities(
	client: &ReqwestClient,
	url: &Url,
) -> Result<Capabilities, ExchangeError> {
	let response = client.get(url.clone()).send().await.map_err(ExchangeError::network)?;
	let bytes = response.bytes().await.map_err(ExchangeError::network)?;

	serde_json::from_slice(&bytes).map_err(|e| ExchangeError::Response { message: e.to_string() })
}

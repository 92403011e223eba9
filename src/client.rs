//! Authenticated API client: credential attachment, 401 detection, and one-shot replay.

pub mod descriptor;

pub use descriptor::*;

// self
use crate::{
	_prelude::*,
	auth::{ClaimsInspector, TokenSecret},
	config::ClientConfig,
	error::{AuthRejection, ConfigError, RejectionKind},
	ext::{BearerSigner, RequestSignerExt},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, TokenState},
	refresh::RefreshCoordinator,
	store::TokenStore,
	transport::{HttpTransport, Request, Response},
};
#[cfg(feature = "reqwest")] use crate::transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestAuthenticatedClient = AuthenticatedClient<ReqwestTransport>;

/// Sends storefront API requests with the stored access token attached.
///
/// Every request other than those aimed at the token endpoints goes through the same steps:
/// attach the access token if it is still usable, send, and on HTTP 401 obtain a new access
/// token through the shared [`RefreshCoordinator`] before replaying the request exactly once.
/// Concurrent 401s share a single refresh call. Responses with any other status are returned
/// as `Ok` so callers keep full control over error handling.
pub struct AuthenticatedClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Endpoint layout and timing knobs.
	pub config: Arc<ClientConfig>,
	/// Transport shared with the refresh coordinator.
	pub transport: Arc<T>,
	/// Token store holding the session's pair.
	pub store: Arc<dyn TokenStore>,
	/// Single-flight refresh coordinator bound to `store` and `transport`.
	pub coordinator: Arc<RefreshCoordinator<T>>,
	inspector: ClaimsInspector,
	signer: Arc<dyn RequestSignerExt<Request, ConfigError>>,
}
impl<T> AuthenticatedClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		config: ClientConfig,
		store: Arc<dyn TokenStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let transport = transport.into();
		let coordinator = RefreshCoordinator::new(
			Arc::clone(&store),
			Arc::clone(&transport),
			config.refresh_endpoint.clone(),
		);

		Self {
			inspector: config.inspector(),
			config: Arc::new(config),
			transport,
			store,
			coordinator: Arc::new(coordinator),
			signer: Arc::new(BearerSigner::default()),
		}
	}

	/// Replaces the default `Authorization: Bearer` signer.
	pub fn with_signer(
		mut self,
		signer: impl 'static + RequestSignerExt<Request, ConfigError>,
	) -> Self {
		self.signer = Arc::new(signer);

		self
	}

	/// Claims inspector used to decide whether the stored token is attached.
	pub fn inspector(&self) -> &ClaimsInspector {
		&self.inspector
	}

	/// Shorthand for `request(RequestDescriptor::get(target))`.
	pub async fn get(&self, target: impl Into<String>) -> Result<Response> {
		self.request(RequestDescriptor::get(target)).await
	}

	/// Sends `descriptor`, refreshing and replaying it once if the server answers 401.
	///
	/// Terminal 401s surface as [`Error::Rejected`] carrying the server's response, with
	/// [`RejectionKind::TokenEndpoint`] for the issuance/refresh endpoints (never intercepted)
	/// or [`RejectionKind::RetryExhausted`] when the replayed request is rejected again or the
	/// descriptor was already marked as retried. When the refresh cycle fails the session is
	/// cleared and the original 401 comes back as [`RejectionKind::RefreshFailed`], with the
	/// shared refresh failure reachable through [`Error::refresh_error`].
	pub async fn request(&self, descriptor: RequestDescriptor) -> Result<Response> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "request");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch(descriptor, &span)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn dispatch(
		&self,
		mut descriptor: RequestDescriptor,
		span: &FlowSpan,
	) -> Result<Response> {
		let url = self.config.resolve(&descriptor.target)?;
		let request = descriptor.to_request(url.clone());

		if self.config.is_token_endpoint(&url) {
			let response = self.transport.send(request).await?;

			return settle(&descriptor, url, RejectionKind::TokenEndpoint, false, response);
		}

		let sent = self.credential_for_send(span).await?;
		let response = self.send_with(request.clone(), sent.as_ref()).await?;

		if !response.is_unauthorized() || descriptor.retried {
			return settle(
				&descriptor,
				url,
				RejectionKind::RetryExhausted,
				sent.is_some(),
				response,
			);
		}

		let token = match self.rotated_since(sent.as_ref()).await? {
			Some(token) => token,
			None => match self.coordinator.refresh().await {
				Ok(token) => token,
				Err(cause) => {
					let method = descriptor.method.clone();
					let sent_with_credentials = sent.is_some();

					return Err(AuthRejection {
						kind: RejectionKind::RefreshFailed,
						method,
						url,
						sent_with_credentials,
						response,
						cause: Some(cause),
					}
					.into());
				},
			},
		};

		descriptor.retried = true;

		let replayed = self.send_with(request, Some(&token)).await?;

		settle(&descriptor, url, RejectionKind::RetryExhausted, true, replayed)
	}

	async fn credential_for_send(&self, span: &FlowSpan) -> Result<Option<TokenSecret>> {
		let Some(pair) = self.store.get().await? else {
			span.record_token_state(TokenState::Missing);

			return Ok(None);
		};
		let state = self.token_state(&pair.access, OffsetDateTime::now_utc());

		span.record_token_state(state);

		if state == TokenState::Usable {
			return Ok(Some(pair.access));
		}
		if self.config.proactive_refresh {
			return Ok(self.coordinator.refresh().await.ok());
		}

		Ok(None)
	}

	fn token_state(&self, access: &TokenSecret, now: OffsetDateTime) -> TokenState {
		match self.inspector.decode(access.expose()).and_then(|claims| claims.exp) {
			None => TokenState::Unreadable,
			Some(_) if self.inspector.is_expired(access.expose(), now) => TokenState::Expired,
			Some(_) => TokenState::Usable,
		}
	}

	// A concurrent cycle may have rotated the token after ours was attached; reuse it instead
	// of spending another refresh.
	async fn rotated_since(&self, sent: Option<&TokenSecret>) -> Result<Option<TokenSecret>> {
		let Some(pair) = self.store.get().await? else { return Ok(None) };

		if sent == Some(&pair.access) {
			return Ok(None);
		}
		if self.inspector.is_usable(pair.access.expose(), OffsetDateTime::now_utc()) {
			return Ok(Some(pair.access));
		}

		Ok(None)
	}

	async fn send_with(&self, request: Request, token: Option<&TokenSecret>) -> Result<Response> {
		let request = match token {
			Some(token) => self.signer.attach_token(request, token)?,
			None => request,
		};

		Ok(self.transport.send(request).await?)
	}
}
#[cfg(feature = "reqwest")]
impl AuthenticatedClient<ReqwestTransport> {
	/// Creates a client with its own reqwest transport honoring [`ClientConfig::timeout`].
	pub fn new(config: ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self, ConfigError> {
		let transport = ReqwestTransport::from_config(&config)?;

		Ok(Self::with_transport(config, store, transport))
	}
}
impl<T> Clone for AuthenticatedClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: Arc::clone(&self.config),
			transport: Arc::clone(&self.transport),
			store: Arc::clone(&self.store),
			coordinator: Arc::clone(&self.coordinator),
			inspector: self.inspector,
			signer: Arc::clone(&self.signer),
		}
	}
}
impl<T> Debug for AuthenticatedClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticatedClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

// Turns a terminal 401 into a rejection; every other response passes through.
fn settle(
	descriptor: &RequestDescriptor,
	url: Url,
	kind: RejectionKind,
	sent_with_credentials: bool,
	response: Response,
) -> Result<Response> {
	if !response.is_unauthorized() {
		return Ok(response);
	}

	let method = descriptor.method.clone();

	Err(AuthRejection { kind, method, url, sent_with_credentials, response, cause: None }.into())
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use http::{StatusCode, header::AUTHORIZATION};
	// self
	use super::*;
	use crate::{
		_preludet::{expired_jwt, fresh_jwt},
		auth::TokenPair,
		refresh::RefreshError,
		store::MemoryStore,
		transport::TransportFuture,
	};

	// Accepts only `Bearer <valid>`; the refresh endpoint answers with `refreshed`.
	struct Gatekeeper {
		valid: String,
		refreshed: String,
		api_calls: AtomicUsize,
		refresh_calls: AtomicUsize,
	}
	impl HttpTransport for Gatekeeper {
		fn send(&self, request: Request) -> TransportFuture<'_> {
			let (status, body) = if request.url.path() == "/api/token/refresh/" {
				self.refresh_calls.fetch_add(1, Ordering::SeqCst);

				(StatusCode::OK, serde_json::json!({ "access": self.refreshed }).to_string())
			} else {
				self.api_calls.fetch_add(1, Ordering::SeqCst);

				let authorized = request
					.headers
					.get(AUTHORIZATION)
					.and_then(|value| value.to_str().ok())
					.is_some_and(|value| value == format!("Bearer {}", self.valid));

				if authorized {
					(StatusCode::OK, "{}".into())
				} else {
					(StatusCode::UNAUTHORIZED, r#"{"detail":"Invalid token"}"#.into())
				}
			};
			let response = Response::new(request.url, status, body.into_bytes());

			Box::pin(async move { Ok(response) })
		}
	}

	fn client(
		gatekeeper: Gatekeeper,
		pair: TokenPair,
		proactive: bool,
	) -> (AuthenticatedClient<Gatekeeper>, Arc<Gatekeeper>, Arc<MemoryStore>) {
		let config = ClientConfig::builder(
			Url::parse("https://shop.example.com").expect("Base URL fixture should parse."),
		)
		.proactive_refresh(proactive)
		.build()
		.expect("Client config fixture should validate.");
		let backend = Arc::new(MemoryStore::with_pair(pair));
		let store: Arc<dyn TokenStore> = backend.clone();
		let transport = Arc::new(gatekeeper);

		let client = AuthenticatedClient::with_transport(config, store, Arc::clone(&transport));

		(client, transport, backend)
	}

	fn gatekeeper(valid: &str, refreshed: &str) -> Gatekeeper {
		Gatekeeper {
			valid: valid.into(),
			refreshed: refreshed.into(),
			api_calls: AtomicUsize::new(0),
			refresh_calls: AtomicUsize::new(0),
		}
	}

	#[tokio::test]
	async fn expired_token_is_not_attached_without_proactive_refresh() {
		let stale = expired_jwt("A1");
		let renewed = fresh_jwt("A2");
		let (client, transport, store) =
			client(gatekeeper(&renewed, &renewed), TokenPair::new(stale.as_str(), "R1"), false);
		let response = client.get("/api/user/profile/").await.expect("Replay should succeed.");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(transport.api_calls.load(Ordering::SeqCst), 2);
		assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
		assert_eq!(store.snapshot(), Some(TokenPair::new(renewed.as_str(), "R1")));
	}

	#[tokio::test]
	async fn proactive_refresh_avoids_the_first_rejection() {
		let renewed = fresh_jwt("A2");
		let (client, transport, _) = client(
			gatekeeper(&renewed, &renewed),
			TokenPair::new(expired_jwt("A1").as_str(), "R1"),
			true,
		);

		client.get("/api/orders/").await.expect("Proactively refreshed request should succeed.");

		assert_eq!(transport.api_calls.load(Ordering::SeqCst), 1);
		assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn unreadable_token_is_treated_as_expired() {
		let renewed = fresh_jwt("A2");
		let (client, transport, _) =
			client(gatekeeper(&renewed, &renewed), TokenPair::new("not-a-jwt", "R1"), false);

		client.get("/api/orders/").await.expect("Replay should succeed.");

		assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn second_rejection_is_retry_exhausted() {
		let (client, transport, _) = client(
			gatekeeper("never-valid", &fresh_jwt("A2")),
			TokenPair::new(fresh_jwt("A1").as_str(), "R1"),
			false,
		);
		let err = client.get("/api/orders/").await.expect_err("Second 401 should surface.");
		let rejection = err.as_rejection().expect("Error should be a rejection.");

		assert_eq!(rejection.kind, RejectionKind::RetryExhausted);
		assert!(rejection.sent_with_credentials);
		assert_eq!(transport.api_calls.load(Ordering::SeqCst), 2);
		assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn anonymous_rejection_returns_the_server_response() {
		let (client, transport, store) = client(
			gatekeeper("never-valid", &fresh_jwt("A2")),
			TokenPair::new(fresh_jwt("A1").as_str(), "R1"),
			false,
		);

		store.clear().await.expect("Clearing the memory store should succeed.");

		let err = client.get("/api/orders/").await.expect_err("Anonymous 401 should surface.");
		let rejection = err.as_rejection().expect("Error should be the original rejection.");

		assert_eq!(rejection.kind, RejectionKind::RefreshFailed);
		assert!(rejection.is_unauthenticated());
		assert_eq!(rejection.response.status, StatusCode::UNAUTHORIZED);
		assert_eq!(rejection.response.text(), r#"{"detail":"Invalid token"}"#);
		assert!(matches!(err.refresh_error(), Some(RefreshError::MissingRefreshToken)));
		assert_eq!(transport.api_calls.load(Ordering::SeqCst), 1);
		assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn retried_descriptor_is_never_replayed() {
		let (client, transport, _) = client(
			gatekeeper("never-valid", &fresh_jwt("A2")),
			TokenPair::new(fresh_jwt("A1").as_str(), "R1"),
			false,
		);
		let err = client
			.request(RequestDescriptor::get("/api/orders/").retried(true))
			.await
			.expect_err("Retried descriptor should not be replayed.");

		assert!(matches!(
			err.as_rejection().map(|rejection| rejection.kind),
			Some(RejectionKind::RetryExhausted)
		));
		assert_eq!(transport.api_calls.load(Ordering::SeqCst), 1);
		assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn token_rotated_by_another_request_is_reused() {
		let current = fresh_jwt("A2");
		let (client, transport, store) = client(
			gatekeeper(&current, &fresh_jwt("A3")),
			TokenPair::new(current.as_str(), "R1"),
			false,
		);
		let sent = TokenSecret::new(fresh_jwt("A1"));
		let reused = client
			.rotated_since(Some(&sent))
			.await
			.expect("Store read should succeed.")
			.expect("Newer stored token should be reused.");

		assert_eq!(reused.expose(), current);
		assert_eq!(
			client.rotated_since(Some(&reused)).await.expect("Store read should succeed."),
			None
		);
		assert_eq!(transport.refresh_calls.load(Ordering::SeqCst), 0);
		assert_eq!(store.snapshot().map(|pair| pair.access), Some(reused));
	}
}

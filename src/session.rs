//! Login/logout boundaries and the route-guard authorization check.

// crates.io
use http::Method;
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	client::AuthenticatedClient,
	error::ConfigError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	transport::{HttpTransport, Request, Response},
};

const LOGIN_FAILED: &str = "Login failed";

#[derive(Serialize)]
struct Credentials<'a> {
	username: &'a str,
	password: &'a str,
}

#[derive(Deserialize)]
struct IssuedPair {
	access: String,
	refresh: String,
}

#[derive(Deserialize)]
struct ErrorDetail {
	detail: Option<String>,
}

/// User session on top of an [`AuthenticatedClient`].
///
/// Login and logout write the token store directly; everything else goes through the client
/// so it shares the client's single-flight refresh.
pub struct Session<T>
where
	T: ?Sized + HttpTransport,
{
	client: AuthenticatedClient<T>,
}
impl<T> Session<T>
where
	T: ?Sized + HttpTransport,
{
	/// Default path of the profile resource fetched by [`Session::profile`].
	pub const PROFILE_PATH: &str = "/api/user/profile/";

	/// Wraps a client.
	pub fn new(client: AuthenticatedClient<T>) -> Self {
		Self { client }
	}

	/// Underlying client.
	pub fn client(&self) -> &AuthenticatedClient<T> {
		&self.client
	}

	/// Exchanges credentials for a token pair at the issuance endpoint and stores it.
	///
	/// A non-2xx answer becomes [`Error::LoginRejected`] with the server's `detail` message
	/// (or `"Login failed"` when the body has none); the stored session is left untouched.
	pub async fn login(&self, username: &str, password: &str) -> Result<()> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.exchange(username, password)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn exchange(&self, username: &str, password: &str) -> Result<()> {
		let request = Request::new(Method::POST, self.client.config.token_endpoint.clone())
			.json(&Credentials { username, password })
			.map_err(ConfigError::from)?;
		let response = self.client.transport.send(request).await?;

		if !response.is_success() {
			return Err(login_rejected(&response));
		}

		let issued: IssuedPair = response.json()?;

		self.client.store.set(TokenPair::new(issued.access, issued.refresh)).await?;

		Ok(())
	}

	/// Forgets both tokens.
	pub async fn logout(&self) -> Result<()> {
		Ok(self.client.store.clear().await?)
	}

	/// Returns `true` while an access token is stored, regardless of its expiry.
	pub async fn is_authenticated(&self) -> Result<bool> {
		Ok(self.client.store.get().await?.is_some())
	}

	/// Route guard: decides whether a protected view may be shown.
	///
	/// A usable access token grants access. Otherwise a stored refresh token gets one
	/// single-flight refresh attempt; its failure denies access instead of erroring. Only
	/// store failures are reported as errors.
	pub async fn authorize(&self) -> Result<bool> {
		let Some(pair) = self.client.store.get().await? else { return Ok(false) };

		if self.client.inspector().is_usable(pair.access.expose(), OffsetDateTime::now_utc()) {
			return Ok(true);
		}

		Ok(self.client.coordinator.refresh().await.is_ok())
	}

	/// Fetches the user profile, ending the session if the server no longer accepts it.
	pub async fn profile<D>(&self) -> Result<D>
	where
		D: DeserializeOwned,
	{
		match self.client.get(Self::PROFILE_PATH).await {
			Ok(response) => response.error_for_status()?.json(),
			Err(e) if e.as_rejection().is_some() => {
				if let Err(cleanup) = self.client.store.clear().await {
					FlowSpan::new(FlowKind::Request, "profile")
						.record_store_failure("clear", &cleanup);
				}

				Err(e)
			},
			Err(e) => Err(e),
		}
	}
}
impl<T> Clone for Session<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { client: self.client.clone() }
	}
}
impl<T> Debug for Session<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session").field("client", &self.client).finish()
	}
}

fn login_rejected(response: &Response) -> Error {
	let detail = serde_json::from_slice::<ErrorDetail>(&response.body)
		.ok()
		.and_then(|body| body.detail)
		.unwrap_or_else(|| LOGIN_FAILED.into());

	Error::LoginRejected { status: response.status.as_u16(), detail }
}

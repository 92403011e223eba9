//! Client configuration: API base URL, token endpoint layout, and timing knobs.

// self
use crate::{_prelude::*, auth::ClaimsInspector, error::ConfigError};

/// Errors raised while constructing or validating a [`ClientConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClientConfigError {
	/// Base URL must use `http` or `https`.
	#[error("The API base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Base URL that failed validation.
		url: String,
	},
	/// Base URL must name a host.
	#[error("The API base URL must include a host: {url}.")]
	MissingHost {
		/// Base URL that failed validation.
		url: String,
	},
	/// Endpoint path cannot be resolved against the base URL.
	#[error("The {endpoint} endpoint path `{path}` cannot be resolved against the base URL.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Path as supplied to the builder.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The refresh endpoint must sit under the token endpoint prefix so it is never intercepted.
	#[error("The refresh endpoint {refresh} is not under the token endpoint prefix {token}.")]
	RefreshOutsideTokenPrefix {
		/// Resolved token endpoint prefix.
		token: String,
		/// Resolved refresh endpoint.
		refresh: String,
	},
	/// Request timeout must be positive.
	#[error("The request timeout must be positive.")]
	NonPositiveTimeout,
}

/// Immutable client configuration consumed by [`AuthenticatedClient`](crate::client::AuthenticatedClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Base URL every request target is resolved against.
	pub base_url: Url,
	/// Token issuance endpoint. Any URL under this path is treated as a token endpoint and is
	/// never intercepted.
	pub token_endpoint: Url,
	/// Refresh endpoint used by the coordinator.
	pub refresh_endpoint: Url,
	/// Per-request transport timeout; also bounds a stuck refresh call.
	pub timeout: Duration,
	/// Refresh before sending when the stored access token is already expired.
	pub proactive_refresh: bool,
	/// Treat access tokens as expired this long before their `exp` claim.
	pub expiry_leeway: Duration,
}
impl ClientConfig {
	/// Default token issuance path.
	pub const DEFAULT_TOKEN_PATH: &str = "/api/token/";
	/// Default refresh path.
	pub const DEFAULT_REFRESH_PATH: &str = "/api/token/refresh/";
	/// Default per-request timeout.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(30);

	/// Creates a new builder for the provided API base URL.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Resolves a request target (relative path or absolute URL) against the base URL.
	pub fn resolve(&self, target: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(target)
			.map_err(|source| ConfigError::InvalidTarget { target: target.to_owned(), source })
	}

	/// Returns `true` for URLs served by the token issuance or refresh endpoints.
	pub fn is_token_endpoint(&self, url: &Url) -> bool {
		[&self.token_endpoint, &self.refresh_endpoint].into_iter().any(|endpoint| {
			url.origin() == endpoint.origin() && url.path().starts_with(endpoint.path())
		})
	}

	/// Claims inspector honoring [`ClientConfig::expiry_leeway`].
	pub fn inspector(&self) -> ClaimsInspector {
		ClaimsInspector::new().with_leeway(self.expiry_leeway)
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// API base URL.
	pub base_url: Url,
	/// Token issuance path, resolved against the base URL.
	pub token_path: String,
	/// Refresh path, resolved against the base URL.
	pub refresh_path: String,
	/// Per-request timeout.
	pub timeout: Duration,
	/// Whether expired tokens are refreshed before sending.
	pub proactive_refresh: bool,
	/// Expiry leeway applied by the claims inspector.
	pub expiry_leeway: Duration,
}
impl ClientConfigBuilder {
	/// Creates a builder seeded with the storefront's default endpoint layout.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			token_path: ClientConfig::DEFAULT_TOKEN_PATH.into(),
			refresh_path: ClientConfig::DEFAULT_REFRESH_PATH.into(),
			timeout: ClientConfig::DEFAULT_TIMEOUT,
			proactive_refresh: false,
			expiry_leeway: Duration::ZERO,
		}
	}

	/// Overrides the token issuance path.
	pub fn token_path(mut self, path: impl Into<String>) -> Self {
		self.token_path = path.into();

		self
	}

	/// Overrides the refresh path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the per-request timeout (defaults to 30 seconds).
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Enables or disables refreshing expired tokens before sending.
	pub fn proactive_refresh(mut self, enabled: bool) -> Self {
		self.proactive_refresh = enabled;

		self
	}

	/// Overrides the expiry leeway. Negative values clamp to zero.
	pub fn expiry_leeway(mut self, leeway: Duration) -> Self {
		self.expiry_leeway = if leeway.is_negative() { Duration::ZERO } else { leeway };

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ClientConfigError> {
		validate_base(&self.base_url)?;

		if !self.timeout.is_positive() {
			return Err(ClientConfigError::NonPositiveTimeout);
		}

		let token_endpoint = resolve_endpoint(&self.base_url, "token", &self.token_path)?;
		let refresh_endpoint = resolve_endpoint(&self.base_url, "refresh", &self.refresh_path)?;
		let config = ClientConfig {
			base_url: self.base_url,
			token_endpoint,
			refresh_endpoint,
			timeout: self.timeout,
			proactive_refresh: self.proactive_refresh,
			expiry_leeway: self.expiry_leeway,
		};

		if !config.is_token_endpoint(&config.refresh_endpoint) {
			return Err(ClientConfigError::RefreshOutsideTokenPrefix {
				token: config.token_endpoint.to_string(),
				refresh: config.refresh_endpoint.to_string(),
			});
		}

		Ok(config)
	}
}

fn validate_base(url: &Url) -> Result<(), ClientConfigError> {
	if !matches!(url.scheme(), "http" | "https") {
		return Err(ClientConfigError::UnsupportedScheme { url: url.to_string() });
	}
	if url.host_str().is_none_or(str::is_empty) {
		return Err(ClientConfigError::MissingHost { url: url.to_string() });
	}

	Ok(())
}

fn resolve_endpoint(
	base: &Url,
	endpoint: &'static str,
	path: &str,
) -> Result<Url, ClientConfigError> {
	base.join(path).map_err(|source| ClientConfigError::InvalidEndpoint {
		endpoint,
		path: path.to_owned(),
		source,
	})
}

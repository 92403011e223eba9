//! Request signing contracts that attach the stored access token to outbound requests.

// crates.io
use http::{HeaderName, HeaderValue, header::AUTHORIZATION};
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError, transport::Request};

/// Describes how to attach a [`TokenSecret`] to an outbound request without constraining the
/// request type.
///
/// The trait is generic over both the request and error types so the same contract can sign
/// the crate's own [`Request`] or a request builder from another HTTP client.
pub trait RequestSignerExt<Request, Error>
where
	Self: Send + Sync,
{
	/// Consumes the provided request and injects the credential derived from `token`.
	fn attach_token(&self, request: Request, token: &TokenSecret) -> Result<Request, Error>;
}

/// Default signer: sets `Authorization: <scheme> <token>` (scheme `Bearer`).
#[derive(Clone, Debug)]
pub struct BearerSigner {
	header: HeaderName,
	scheme: String,
}
impl BearerSigner {
	/// Uses a scheme other than `Bearer` (for example `JWT`).
	pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
		self.scheme = scheme.into();

		self
	}

	/// Writes the credential to a header other than `Authorization`.
	pub fn with_header(mut self, header: HeaderName) -> Self {
		self.header = header;

		self
	}
}
impl Default for BearerSigner {
	fn default() -> Self {
		Self { header: AUTHORIZATION, scheme: "Bearer".into() }
	}
}
impl RequestSignerExt<Request, ConfigError> for BearerSigner {
	fn attach_token(&self, mut request: Request, token: &TokenSecret) -> Result<Request, ConfigError> {
		let mut value = HeaderValue::try_from(format!("{} {}", self.scheme, token.expose()))
			.map_err(|_| ConfigError::InvalidHeader { name: self.header.to_string() })?;

		value.set_sensitive(true);
		request.headers.insert(self.header.clone(), value);

		Ok(request)
	}
}

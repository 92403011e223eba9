//! The access/refresh pair persisted between sessions.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access and refresh credentials issued together by the token endpoint.
///
/// Both halves are opaque to the server's clients; only the access token is decoded locally
/// (see [`ClaimsInspector`](crate::auth::ClaimsInspector)). The pair is the unit of storage so
/// a reader never observes one half updated without the other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Short-lived credential attached to each authenticated request.
	pub access: TokenSecret,
	/// Longer-lived credential used solely to obtain a new access token.
	pub refresh: TokenSecret,
}
impl TokenPair {
	/// Creates a pair from raw token strings.
	pub fn new(access: impl Into<TokenSecret>, refresh: impl Into<TokenSecret>) -> Self {
		Self { access: access.into(), refresh: refresh.into() }
	}

	/// Returns a copy carrying a new access token and, when the server rotated it, a new refresh
	/// token.
	pub fn rotated(&self, access: TokenSecret, refresh: Option<TokenSecret>) -> Self {
		Self { access, refresh: refresh.unwrap_or_else(|| self.refresh.clone()) }
	}
}

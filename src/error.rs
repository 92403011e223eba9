//! Client-level error types shared across the transport, refresh coordinator, and stores.

// crates.io
use http::Method;
// self
use crate::{_prelude::*, config::ClientConfigError, refresh::RefreshError, transport::Response};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration or request construction problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Remote side rejected the request as unauthenticated and no retry is possible.
	#[error(transparent)]
	Rejected(Box<AuthRejection>),

	/// Non-success status surfaced through [`Response::error_for_status`].
	#[error("Request to {url} failed with HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Resolved request URL.
		url: String,
		/// Response body, lossily decoded as UTF-8.
		body: String,
	},
	/// Response body could not be decoded into the requested type.
	#[error("Response body from {url} could not be decoded.")]
	Decode {
		/// Resolved request URL.
		url: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Issuance endpoint refused the supplied credentials.
	#[error("Login was rejected with HTTP {status}: {detail}.")]
	LoginRejected {
		/// HTTP status code.
		status: u16,
		/// Server-supplied `detail` message, or a generic fallback.
		detail: String,
	},
}

impl Error {
	/// Returns the authentication rejection, if this error is one.
	pub fn as_rejection(&self) -> Option<&AuthRejection> {
		match self {
			Self::Rejected(rejection) => Some(&**rejection),
			_ => None,
		}
	}

	/// Returns the failed refresh behind a [`RejectionKind::RefreshFailed`] rejection.
	pub fn refresh_error(&self) -> Option<&RefreshError> {
		self.as_rejection().and_then(|rejection| rejection.cause.as_ref())
	}
}
impl From<AuthRejection> for Error {
	fn from(rejection: AuthRejection) -> Self {
		Self::Rejected(Box::new(rejection))
	}
}

/// Configuration and request construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Client configuration failed validation.
	#[error(transparent)]
	Client(#[from] ClientConfigError),
	/// Request target cannot be resolved against the API base URL.
	#[error("Request target `{target}` cannot be resolved against the API base URL.")]
	InvalidTarget {
		/// Target as supplied by the caller.
		target: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Header name or value is not valid HTTP.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Header name as supplied by the caller.
		name: String,
	},
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be serialized to JSON.")]
	Body(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Resolved request URL.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Request exceeded the configured transport timeout.
	#[error("Request to {url} timed out.")]
	Timeout {
		/// Resolved request URL.
		url: String,
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: &Url, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { url: url.to_string(), source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(url: &Url, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { url: url.to_string(), source: Box::new(src) }
	}
}

/// Why an authentication failure was surfaced instead of replayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
	/// The request targeted the issuance/refresh endpoint, which is never intercepted.
	TokenEndpoint,
	/// The request was already replayed once with a refreshed token.
	RetryExhausted,
	/// The refresh cycle triggered by this rejection failed; the session has been cleared.
	RefreshFailed,
}
impl RejectionKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RejectionKind::TokenEndpoint => "token_endpoint",
			RejectionKind::RetryExhausted => "retry_exhausted",
			RejectionKind::RefreshFailed => "refresh_failed",
		}
	}
}
impl Display for RejectionKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// The original HTTP 401 returned to the caller once no further retry is allowed.
///
/// The response is the one the server actually sent. When the refresh it triggered failed,
/// the shared [`RefreshError`] is kept as `cause` and reported as the error source.
#[derive(Debug, ThisError)]
#[error("{method} {url} was rejected with HTTP {} ({kind}).", .response.status.as_u16())]
pub struct AuthRejection {
	/// Reason the rejection was surfaced.
	pub kind: RejectionKind,
	/// Method of the rejected request.
	pub method: Method,
	/// Resolved URL of the rejected request.
	pub url: Url,
	/// Whether a bearer credential was attached to the rejected attempt.
	pub sent_with_credentials: bool,
	/// Rejected response as received from the server.
	pub response: Response,
	/// Refresh failure shared by every waiter of the cycle this rejection triggered.
	#[source]
	pub cause: Option<RefreshError>,
}
impl AuthRejection {
	/// Returns `true` when the rejected attempt carried no bearer credential.
	pub fn is_unauthenticated(&self) -> bool {
		!self.sent_with_credentials
	}
}

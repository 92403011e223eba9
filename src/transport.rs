//! Transport primitives for storefront API calls.
//!
//! The module exposes [`HttpTransport`] alongside the owned [`Request`] and [`Response`] values
//! so downstream crates can plug in custom HTTP stacks (or in-process fakes for tests) without
//! touching the refresh machinery. The reqwest-backed [`ReqwestTransport`] is the default.

// crates.io
use http::{HeaderMap, Method, StatusCode, header::CONTENT_TYPE};
use serde::de::DeserializeOwned;
// self
use crate::{_prelude::*, error::TransportError};
#[cfg(feature = "reqwest")] use crate::{config::ClientConfig, error::ConfigError};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Response, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing storefront API calls.
///
/// Implementations must resolve with a [`Response`] for every HTTP status, including 4xx and
/// 5xx; only failures that produced no response (DNS, TCP, TLS, timeouts) map to
/// [`TransportError`]. Implementations must be `Send + Sync + 'static` so a single transport
/// can be shared by the client and its refresh coordinator.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes the request.
	fn send(&self, request: Request) -> TransportFuture<'_>;
}

/// Fully resolved outbound request handed to a transport.
#[derive(Clone, Debug)]
pub struct Request {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Request headers, including any attached credential.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
}
impl Request {
	/// Creates a body-less request.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None }
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn json<B>(mut self, body: &B) -> Result<Self, serde_json::Error>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body)?);
		self.headers.insert(CONTENT_TYPE, http::HeaderValue::from_static("application/json"));

		Ok(self)
	}
}

/// Response captured from the transport with its body fully buffered.
///
/// Additional fields may be added in future releases, so downstream code should construct
/// values with [`Response::new`] instead of struct literals.
#[derive(Clone, Debug)]
pub struct Response {
	/// URL the response was received from.
	pub url: Url,
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Buffered response body.
	pub body: Vec<u8>,
}
impl Response {
	/// Creates a response without headers.
	pub fn new(url: Url, status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { url, status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Replaces the response headers.
	pub fn with_headers(mut self, headers: HeaderMap) -> Self {
		self.headers = headers;

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns `true` when the server rejected the request as unauthenticated (HTTP 401).
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}

	/// Body decoded as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Deserializes the JSON body, reporting the path of the first mismatching field.
	pub fn json<D>(&self) -> Result<D>
	where
		D: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::Decode { url: self.url.to_string(), source })
	}

	/// Converts non-2xx responses into [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Status {
				status: self.status.as_u16(),
				url: self.url.to_string(),
				body: self.text(),
			})
		}
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client whose per-request timeout matches [`ClientConfig::timeout`].
	///
	/// The timeout is also what bounds a stuck refresh call, since the coordinator issues it
	/// through this same transport.
	pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
		let timeout =
			std::time::Duration::try_from(config.timeout).map_err(ConfigError::http_client_build)?;
		let client = ReqwestClient::builder().timeout(timeout).build()?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: Request) -> TransportFuture<'_> {
		Box::pin(async move {
			let Request { method, url, headers, body } = request;
			let mut builder = self.0.request(method, url.clone()).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(|e| map_reqwest_error(&url, e))?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(|e| map_reqwest_error(&url, e))?;

			Ok(Response::new(url, status, body.to_vec()).with_headers(headers))
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(url: &Url, e: ReqwestError) -> TransportError {
	if e.is_timeout() { TransportError::timeout(url, e) } else { TransportError::network(url, e) }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn fixture_url() -> Url {
		Url::parse("https://shop.example.com/api/products/")
			.expect("Response fixture URL should parse.")
	}

	#[test]
	fn json_decoding_reports_the_failing_path() {
		#[derive(Debug, Deserialize)]
		struct Product {
			#[allow(dead_code)]
			price: u32,
		}

		let response =
			Response::new(fixture_url(), StatusCode::OK, br#"{"price":"free"}"#.to_vec());
		let err = response.json::<Product>().expect_err("String price should not decode.");

		match err {
			Error::Decode { source, .. } => assert_eq!(source.path().to_string(), "price"),
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}

	#[test]
	fn error_for_status_keeps_successes() {
		let ok = Response::new(fixture_url(), StatusCode::OK, Vec::new());
		let missing = Response::new(fixture_url(), StatusCode::NOT_FOUND, b"gone".to_vec());

		assert!(ok.error_for_status().is_ok());
		assert!(matches!(
			missing.error_for_status(),
			Err(Error::Status { status: 404, ref body, .. }) if body == "gone"
		));
	}

	#[test]
	fn json_request_sets_content_type() {
		let request = Request::new(Method::POST, fixture_url())
			.json(&serde_json::json!({ "refresh": "R1" }))
			.expect("JSON body should serialize.");

		assert_eq!(
			request.headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok()),
			Some("application/json")
		);
		assert_eq!(request.body.as_deref(), Some(br#"{"refresh":"R1"}"#.as_slice()));
	}
}

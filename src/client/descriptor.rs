//! Caller-facing description of one API request.

// crates.io
use http::{HeaderMap, HeaderName, HeaderValue, Method};
// self
use crate::{_prelude::*, error::ConfigError, transport::Request};

/// Method, target, headers, and body of a request before credentials are attached.
///
/// `target` is either a path resolved against [`ClientConfig::base_url`] or an absolute URL.
/// `retried` marks a descriptor that has already been replayed after an authentication
/// failure; the client never replays such a descriptor again.
///
/// [`ClientConfig::base_url`]: crate::config::ClientConfig::base_url
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Relative path or absolute URL.
	pub target: String,
	/// Caller-supplied headers. Any credential header is overwritten by the signer.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
	/// Set once the request has been replayed after a refresh.
	pub retried: bool,
}
impl RequestDescriptor {
	/// Creates a body-less descriptor.
	pub fn new(method: Method, target: impl Into<String>) -> Self {
		Self { method, target: target.into(), headers: HeaderMap::new(), body: None, retried: false }
	}

	/// `GET` descriptor.
	pub fn get(target: impl Into<String>) -> Self {
		Self::new(Method::GET, target)
	}

	/// `POST` descriptor.
	pub fn post(target: impl Into<String>) -> Self {
		Self::new(Method::POST, target)
	}

	/// `PUT` descriptor.
	pub fn put(target: impl Into<String>) -> Self {
		Self::new(Method::PUT, target)
	}

	/// `PATCH` descriptor.
	pub fn patch(target: impl Into<String>) -> Self {
		Self::new(Method::PATCH, target)
	}

	/// `DELETE` descriptor.
	pub fn delete(target: impl Into<String>) -> Self {
		Self::new(Method::DELETE, target)
	}

	/// Appends a header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.append(name, value);

		self
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn json<B>(mut self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body)?);
		self.headers
			.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Sets a raw body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Marks the descriptor as already replayed, disabling refresh-and-retry for it.
	pub fn retried(mut self, retried: bool) -> Self {
		self.retried = retried;

		self
	}

	pub(crate) fn to_request(&self, url: Url) -> Request {
		let mut request = Request::new(self.method.clone(), url);

		request.headers = self.headers.clone();
		request.body = self.body.clone();

		request
	}
}

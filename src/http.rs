//! Transport primitives for authenticated API calls.
//!
//! [`OutboundRequest`] and [`HttpResponse`] are plain owned values so a request can be
//! replayed after a token refresh without touching the caller's copy. [`HttpTransport`] is
//! the client's only dependency on an HTTP stack: [`ReqwestTransport`] is the default, and
//! tests or embedders can plug in anything that turns a request into a response.

// std
use std::ops::Deref;
// crates.io
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::SessionConfig,
	error::{ConfigError, StatusError, TransportError},
	obs::{self, FlowKind},
};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing a single request.
///
/// Implementations must not follow the session's retry rules themselves: a `401` is an
/// ordinary response here and the client decides whether to refresh.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends the request and resolves with whatever the server answered.
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		self.as_ref().execute(request)
	}
}

/// Description of an HTTP call passed through the session.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Request headers.
	pub headers: HeaderMap,
	/// Optional raw body.
	pub body: Option<Vec<u8>>,
}
impl OutboundRequest {
	/// Creates a request without headers or body.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: HeaderMap::new(), body: None }
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(url: Url) -> Self {
		Self::new(Method::PUT, url)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(url: Url) -> Self {
		Self::new(Method::DELETE, url)
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
		let invalid = || ConfigError::InvalidHeader { name: name.to_owned() };
		let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
		let value = HeaderValue::from_str(value).map_err(|_| invalid())?;

		self.headers.insert(name, value);

		Ok(self)
	}

	/// Serializes `body` as JSON and sets `Content-Type: application/json`.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body)?);
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Same as [`Self::json`] for an already-built JSON value, which cannot fail to serialize.
	pub fn with_json_value(mut self, body: &serde_json::Value) -> Self {
		self.body = Some(body.to_string().into_bytes());
		self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

		self
	}

	/// Returns the current `Authorization` header, if any.
	pub fn authorization(&self) -> Option<&str> {
		self.headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
	}

	/// Returns a copy carrying `Authorization: Bearer <token>`, or without the header when
	/// `token` is `None` or cannot be encoded as a header value.
	pub(crate) fn with_bearer(&self, token: Option<&TokenSecret>) -> Self {
		let mut request = self.clone();
		let value = token.and_then(|token| match HeaderValue::from_str(&token.bearer()) {
			Ok(value) => Some(value),
			Err(e) => {
				obs::warn_swallowed(
					FlowKind::Send,
					"Access token is not a valid header value; sending the request without it.",
					&e,
				);

				None
			},
		});

		match value {
			Some(mut value) => {
				value.set_sensitive(true);
				request.headers.insert(AUTHORIZATION, value);
			},
			None => {
				request.headers.remove(AUTHORIZATION);
			},
		}

		request
	}

	/// Fills in headers from `defaults` that the request does not set itself.
	pub(crate) fn with_default_headers(mut self, defaults: &HeaderMap) -> Self {
		for (name, value) in defaults {
			if !self.headers.contains_key(name) {
				self.headers.insert(name.clone(), value.clone());
			}
		}

		self
	}
}

/// Fully buffered HTTP response.
#[derive(Clone, Debug)]
pub struct HttpResponse {
	/// Response status code.
	pub status: StatusCode,
	/// Final URL of the request.
	pub url: Url,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates a response with an empty header map.
	pub fn new(status: StatusCode, url: Url, body: impl Into<Vec<u8>>) -> Self {
		Self { status, url, headers: HeaderMap::new(), body: body.into() }
	}

	/// Returns `true` for `2xx` statuses.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	/// Returns the body decoded lossily as UTF-8.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::Decode { url: self.url.to_string(), source })
	}

	/// Converts non-success statuses into [`StatusError`].
	pub fn error_for_status(self) -> Result<Self, StatusError> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(StatusError { status: self.status, url: self.url.clone(), body: self.text() })
		}
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client honoring the configured request timeout.
	pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
		let mut builder = ReqwestClient::builder();

		if let Some(timeout) = config.request_timeout {
			builder = builder.timeout(timeout);
		}

		Ok(Self(builder.build()?))
	}
}
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let OutboundRequest { method, url, headers, body } = request;
			let mut builder = self.0.request(method, url.clone()).headers(headers);

			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(|e| TransportError::network(&url, e))?;
			let status = response.status();
			let final_url = response.url().to_owned();
			let headers = response.headers().to_owned();
			let body =
				response.bytes().await.map_err(|e| TransportError::network(&final_url, e))?;

			Ok(HttpResponse { status, url: final_url, headers, body: body.to_vec() })
		})
	}
}

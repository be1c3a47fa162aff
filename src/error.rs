//! Session-level error types shared across the client, session, and stores.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Durable token storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The session could not be renewed; the user has been logged out.
	#[error(transparent)]
	Refresh(#[from] RefreshError),
	/// Server answered with a non-success status that was not recovered locally.
	#[error(transparent)]
	Status(#[from] StatusError),

	/// Response body could not be decoded into the requested type.
	#[error("Response body from {url} could not be decoded.")]
	Decode {
		/// URL of the request whose body failed to decode.
		url: String,
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns the HTTP status carried by the error, if any.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Status(err) => Some(err.status),
			Self::Refresh(RefreshError::Rejected { status, .. }) =>
				StatusCode::from_u16(*status).ok(),
			_ => None,
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL cannot have paths joined onto it.
	#[error("Base URL `{url}` cannot be used as an API root.")]
	InvalidBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// A relative endpoint could not be resolved against the base URL.
	#[error("Endpoint `{path}` could not be resolved against the base URL.")]
	InvalidEndpoint {
		/// Relative path that failed to resolve.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header name or value is not valid HTTP.
	#[error("Header `{name}` is not a valid HTTP header.")]
	InvalidHeader {
		/// Header name as supplied.
		name: String,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Serialize(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Target URL of the failed request.
		url: String,
		/// Transport-specific network error.
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
}

/// Non-success HTTP response surfaced to the caller unchanged.
#[derive(Clone, Debug, ThisError)]
#[error("Request to {url} failed with HTTP {status}.")]
pub struct StatusError {
	/// Response status code.
	pub status: StatusCode,
	/// Final request URL.
	pub url: Url,
	/// Response body decoded lossily as UTF-8.
	pub body: String,
}
impl StatusError {
	/// Returns `true` for `401 Unauthorized`.
	pub fn is_unauthorized(&self) -> bool {
		self.status == StatusCode::UNAUTHORIZED
	}
}

/// Failure to renew the session. Every caller waiting on the same refresh receives a clone.
#[derive(Clone, Debug, ThisError)]
pub enum RefreshError {
	/// No refresh token was available when the access token expired.
	#[error("No refresh token available.")]
	MissingRefreshToken,
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the refresh token with HTTP {status}.")]
	Rejected {
		/// HTTP status code returned by the refresh endpoint.
		status: u16,
		/// Response body decoded lossily as UTF-8.
		body: String,
	},
	/// Refresh endpoint could not be reached.
	#[error("Refresh endpoint could not be reached.")]
	Transport(#[source] Arc<TransportError>),
	/// Refresh endpoint returned a body without the expected token pair.
	#[error("Refresh endpoint returned malformed JSON: {message}.")]
	MalformedResponse {
		/// Parser message including the JSON path.
		message: String,
	},
	/// Session was logged out after this request was dispatched.
	#[error("Session ended before the request could be retried.")]
	SessionEnded,
	/// The task performing the refresh was dropped before finishing.
	#[error("Token refresh was abandoned before completing.")]
	Abandoned,
}
impl From<TransportError> for RefreshError {
	fn from(e: TransportError) -> Self {
		Self::Transport(Arc::new(e))
	}
}

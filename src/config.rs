//! Client configuration: API root, authentication endpoints, and request defaults.

// std
use std::{collections::BTreeMap, time::Duration};
// self
use crate::{_prelude::*, error::ConfigError};

/// Settings shared by every request issued through an
/// [`AuthenticatedClient`](crate::client::AuthenticatedClient).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
	/// API root; relative request paths and the auth endpoints resolve against it.
	pub base_url: Url,
	/// Path of the token refresh endpoint, relative to `base_url`.
	pub refresh_path: String,
	/// Path of the credential login endpoint, relative to `base_url`.
	pub login_path: String,
	/// Path of the account registration endpoint, relative to `base_url`.
	pub register_path: String,
	/// Path of the password change endpoint, relative to `base_url`.
	pub password_path: String,
	/// Path of the current-user endpoint, relative to `base_url`.
	pub me_path: String,
	/// Client-side route the logout collaborator should send the user to.
	pub login_route: String,
	/// Headers added to every request that does not set them itself.
	pub default_headers: BTreeMap<String, String>,
	/// Per-request timeout applied by the built-in transport.
	pub request_timeout: Option<Duration>,
}
impl SessionConfig {
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &'static str = "auth/refresh";
	/// Default login endpoint path.
	pub const DEFAULT_LOGIN_PATH: &'static str = "auth/login";
	/// Default registration endpoint path.
	pub const DEFAULT_REGISTER_PATH: &'static str = "auth/register";
	/// Default password change endpoint path.
	pub const DEFAULT_PASSWORD_PATH: &'static str = "auth/update-password";
	/// Default current-user endpoint path.
	pub const DEFAULT_ME_PATH: &'static str = "auth/me";
	/// Default login route used as the logout redirect target.
	pub const DEFAULT_LOGIN_ROUTE: &'static str = "/logg-inn";

	/// Returns a builder rooted at `base_url`.
	pub fn builder(base_url: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(base_url)
	}

	/// Resolves `path` against the base URL. Absolute URLs are returned as-is.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidEndpoint { path: path.to_owned(), source })
	}

	/// Absolute URL of the refresh endpoint.
	pub fn refresh_url(&self) -> Result<Url, ConfigError> {
		self.endpoint(&self.refresh_path)
	}

	/// Absolute URL of the login endpoint.
	pub fn login_url(&self) -> Result<Url, ConfigError> {
		self.endpoint(&self.login_path)
	}

	/// Compiles [`Self::default_headers`] into a header map.
	pub fn header_map(&self) -> Result<HeaderMap, ConfigError> {
		let mut headers = HeaderMap::with_capacity(self.default_headers.len());

		for (name, value) in &self.default_headers {
			let invalid = || ConfigError::InvalidHeader { name: name.clone() };
			let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
			let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;

			headers.insert(header_name, header_value);
		}

		Ok(headers)
	}
}

/// Builder for [`SessionConfig`] values.
#[derive(Debug)]
pub struct SessionConfigBuilder {
	/// API root being configured.
	pub base_url: Url,
	/// Refresh endpoint path.
	pub refresh_path: String,
	/// Login endpoint path.
	pub login_path: String,
	/// Registration endpoint path.
	pub register_path: String,
	/// Password change endpoint path.
	pub password_path: String,
	/// Current-user endpoint path.
	pub me_path: String,
	/// Logout redirect target.
	pub login_route: String,
	/// Default request headers.
	pub default_headers: BTreeMap<String, String>,
	/// Optional per-request timeout.
	pub request_timeout: Option<Duration>,
}
impl SessionConfigBuilder {
	/// Creates a builder with the stock endpoints and a JSON content type.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			refresh_path: SessionConfig::DEFAULT_REFRESH_PATH.into(),
			login_path: SessionConfig::DEFAULT_LOGIN_PATH.into(),
			register_path: SessionConfig::DEFAULT_REGISTER_PATH.into(),
			password_path: SessionConfig::DEFAULT_PASSWORD_PATH.into(),
			me_path: SessionConfig::DEFAULT_ME_PATH.into(),
			login_route: SessionConfig::DEFAULT_LOGIN_ROUTE.into(),
			default_headers: BTreeMap::from([(
				"content-type".to_owned(),
				"application/json".to_owned(),
			)]),
			request_timeout: None,
		}
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the login endpoint path.
	pub fn login_path(mut self, path: impl Into<String>) -> Self {
		self.login_path = path.into();

		self
	}

	/// Overrides the registration endpoint path.
	pub fn register_path(mut self, path: impl Into<String>) -> Self {
		self.register_path = path.into();

		self
	}

	/// Overrides the password change endpoint path.
	pub fn password_path(mut self, path: impl Into<String>) -> Self {
		self.password_path = path.into();

		self
	}

	/// Overrides the current-user endpoint path.
	pub fn me_path(mut self, path: impl Into<String>) -> Self {
		self.me_path = path.into();

		self
	}

	/// Overrides the route reported to the logout collaborator.
	pub fn login_route(mut self, route: impl Into<String>) -> Self {
		self.login_route = route.into();

		self
	}

	/// Adds or replaces a default header.
	pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.default_headers.insert(name.into().to_ascii_lowercase(), value.into());

		self
	}

	/// Sets the per-request timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);

		self
	}

	/// Validates the configuration and returns a [`SessionConfig`].
	pub fn build(self) -> Result<SessionConfig, ConfigError> {
		let mut base_url = self.base_url;

		if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
			return Err(ConfigError::InvalidBaseUrl { url: base_url.to_string() });
		}
		// Without the trailing slash `join` would drop the last path segment.
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		let config = SessionConfig {
			base_url,
			refresh_path: self.refresh_path,
			login_path: self.login_path,
			register_path: self.register_path,
			password_path: self.password_path,
			me_path: self.me_path,
			login_route: self.login_route,
			default_headers: self.default_headers,
			request_timeout: self.request_timeout,
		};

		config.refresh_url()?;
		config.login_url()?;
		config.endpoint(&config.register_path)?;
		config.endpoint(&config.password_path)?;
		config.endpoint(&config.me_path)?;
		config.header_map()?;

		Ok(config)
	}
}

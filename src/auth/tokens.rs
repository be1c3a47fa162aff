//! Token pair model plus the JSON shapes of the login and refresh endpoints.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access + refresh token pair issued by the authentication endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Bearer credential attached to every authenticated request.
	pub access_token: TokenSecret,
	/// Longer-lived credential exchanged for a new pair, when one was issued.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the pair was received.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
}
impl TokenPair {
	/// Creates a pair stamped with the current UTC instant.
	pub fn new(access_token: impl Into<TokenSecret>, refresh_token: Option<TokenSecret>) -> Self {
		Self { access_token: access_token.into(), refresh_token, issued_at: OffsetDateTime::now_utc() }
	}
}

/// Email + password credentials accepted by `POST /auth/login`.
#[derive(Clone, Debug, Serialize)]
pub struct Credentials {
	/// Account email address.
	pub email: String,
	/// Account password.
	#[serde(serialize_with = "expose_secret")]
	pub password: TokenSecret,
}
impl Credentials {
	/// Builds credentials from an email/password pair.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: TokenSecret::new(password.into()) }
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponseBody {
	pub(crate) access_token: String,
	pub(crate) refresh_token: String,
}
impl From<RefreshResponseBody> for TokenPair {
	fn from(body: RefreshResponseBody) -> Self {
		Self::new(body.access_token, Some(TokenSecret::new(body.refresh_token)))
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponseBody {
	pub(crate) access_token: String,
	#[serde(default)]
	pub(crate) refresh_token: Option<String>,
}
impl From<LoginResponseBody> for TokenPair {
	fn from(body: LoginResponseBody) -> Self {
		let refresh = body.refresh_token.filter(|value| !value.is_empty()).map(TokenSecret::new);

		Self::new(body.access_token, refresh)
	}
}

pub(crate) fn expose_secret<S>(secret: &TokenSecret, serializer: S) -> Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(secret.expose())
}

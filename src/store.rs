//! Durable token storage contract and the built-in stores.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable storage for the session's token pair, the analogue of browser local storage.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns the persisted access token, if any.
	fn access_token(&self) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Returns the persisted refresh token, if any.
	fn refresh_token(&self) -> StoreFuture<'_, Option<TokenSecret>>;

	/// Persists a new pair, replacing whatever was stored.
	fn set_tokens<'a>(&'a self, access: &'a str, refresh: Option<&'a str>) -> StoreFuture<'a, ()>;

	/// Removes both tokens.
	fn clear_tokens(&self) -> StoreFuture<'_, ()>;
}

/// Snapshot persisted by the built-in stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Refresh token secret, when one was issued.
	pub refresh_token: Option<TokenSecret>,
	/// Instant of the last write.
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl StoredTokens {
	/// Builds a snapshot stamped with the current UTC instant.
	pub fn new(access: &str, refresh: Option<&str>) -> Self {
		Self {
			access_token: TokenSecret::new(access),
			refresh_token: refresh.map(TokenSecret::new),
			updated_at: OffsetDateTime::now_utc(),
		}
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

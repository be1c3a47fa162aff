//! Thread-safe in-memory [`TokenStore`] for tests and short-lived processes.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	store::{StoreFuture, StoredTokens, TokenStore},
};

type Slot = Arc<RwLock<Option<StoredTokens>>>;

/// Keeps the token pair in process memory. Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Returns a copy of the stored snapshot.
	pub fn snapshot(&self) -> Option<StoredTokens> {
		self.0.read().clone()
	}

	fn set_now(slot: Slot, access: &str, refresh: Option<&str>) {
		*slot.write() = Some(StoredTokens::new(access, refresh));
	}
}
impl TokenStore for MemoryStore {
	fn access_token(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().as_ref().map(|tokens| tokens.access_token.clone())) })
	}

	fn refresh_token(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		let slot = self.0.clone();

		Box::pin(
			async move { Ok(slot.read().as_ref().and_then(|tokens| tokens.refresh_token.clone())) },
		)
	}

	fn set_tokens<'a>(&'a self, access: &'a str, refresh: Option<&'a str>) -> StoreFuture<'a, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			Self::set_now(slot, access, refresh);

			Ok(())
		})
	}

	fn clear_tokens(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			slot.write().take();

			Ok(())
		})
	}
}

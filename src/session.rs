//! Process-wide token pair shared by every request of an authenticated client.
//!
//! A [`Session`] is created once (usually via [`Session::restore`]) and handed to the client
//! as `Arc<Session>`. Every mutation (login, refresh, logout) bumps a generation counter so a
//! request that failed with an old credential can tell the pair has already moved on.

mod logout;

pub use logout::*;

// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	obs,
	store::{StoreError, TokenStore},
};

/// Access token attached to a request, tagged with the session generation it came from.
#[derive(Clone, Debug)]
pub(crate) struct Credential {
	pub(crate) access_token: Option<TokenSecret>,
	pub(crate) generation: u64,
}

#[derive(Default)]
struct SessionTokens {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	generation: u64,
}

/// Result of offering a refreshed pair to the session.
#[derive(Debug)]
pub(crate) enum Renewal {
	/// The pair was installed; carries the outcome of the durable write.
	Applied(Result<(), StoreError>),
	/// The session changed while the refresh was in flight; carries its current access token.
	Superseded(Option<TokenSecret>),
}

/// Current access/refresh pair, mirrored into a durable [`TokenStore`].
///
/// Mutations hold `persist` from the in-memory write until the store write finishes, so the
/// store observes them in the same order as memory.
pub struct Session {
	tokens: RwLock<SessionTokens>,
	persist: AsyncMutex<()>,
	store: Arc<dyn TokenStore>,
	logout_handler: Arc<dyn LogoutHandler>,
}
impl Session {
	/// Creates an empty session over `store`.
	pub fn new(store: Arc<dyn TokenStore>, logout_handler: Arc<dyn LogoutHandler>) -> Self {
		Self {
			tokens: RwLock::new(SessionTokens::default()),
			persist: AsyncMutex::new(()),
			store,
			logout_handler,
		}
	}

	/// Creates a session seeded from whatever `store` already holds.
	pub async fn restore(
		store: Arc<dyn TokenStore>,
		logout_handler: Arc<dyn LogoutHandler>,
	) -> Result<Self> {
		let access_token = store.access_token().await?;
		let refresh_token = store.refresh_token().await?;
		let session = Self::new(store, logout_handler);

		if access_token.is_some() || refresh_token.is_some() {
			let mut tokens = session.tokens.write();

			tokens.access_token = access_token;
			tokens.refresh_token = refresh_token;
		}

		Ok(session)
	}

	/// Returns the current access token.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.tokens.read().access_token.clone()
	}

	/// Returns the current refresh token.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.tokens.read().refresh_token.clone()
	}

	/// Returns `true` while an access token is held.
	pub fn is_authenticated(&self) -> bool {
		self.tokens.read().access_token.is_some()
	}

	/// Counter bumped on every token mutation.
	pub fn generation(&self) -> u64 {
		self.tokens.read().generation
	}

	pub(crate) fn credential(&self) -> Credential {
		let tokens = self.tokens.read();

		Credential { access_token: tokens.access_token.clone(), generation: tokens.generation }
	}

	/// Refresh token together with the generation it belongs to.
	pub(crate) fn refresh_grant(&self) -> (Option<TokenSecret>, u64) {
		let tokens = self.tokens.read();

		(tokens.refresh_token.clone(), tokens.generation)
	}

	/// Replaces the pair in memory, then persists it.
	///
	/// The in-memory pair is updated even if the durable write fails.
	pub async fn update_tokens(&self, pair: &TokenPair) -> Result<(), StoreError> {
		let _persist = self.persist.lock().await;

		self.install(pair);
		self.persist_pair(pair).await
	}

	/// Installs a refreshed pair only if nothing mutated the session since `generation`.
	pub(crate) async fn renew_tokens(&self, generation: u64, pair: &TokenPair) -> Renewal {
		let _persist = self.persist.lock().await;
		let current = {
			let tokens = self.tokens.read();

			(tokens.generation != generation).then(|| tokens.access_token.clone())
		};

		if let Some(access_token) = current {
			return Renewal::Superseded(access_token);
		}

		self.install(pair);

		Renewal::Applied(self.persist_pair(pair).await)
	}

	/// Drops both tokens from memory and durable storage without notifying the logout handler.
	pub async fn clear(&self) -> Result<(), StoreError> {
		let _persist = self.persist.lock().await;

		self.clear_memory();
		self.store.clear_tokens().await
	}

	/// Ends the session: clears both tokens and notifies the logout handler.
	///
	/// The handler is notified even if the durable store could not be cleared; that failure is
	/// returned afterwards.
	pub async fn logout(&self, reason: LogoutReason, redirect_to: &str) -> Result<(), StoreError> {
		let cleared = {
			let _persist = self.persist.lock().await;

			self.clear_memory();
			self.store.clear_tokens().await
		};

		obs::record_logout(&reason);
		self.logout_handler
			.logged_out(&LogoutEvent { reason, redirect_to: redirect_to.to_owned() });

		cleared
	}

	fn install(&self, pair: &TokenPair) {
		let mut tokens = self.tokens.write();

		tokens.access_token = Some(pair.access_token.clone());
		tokens.refresh_token = pair.refresh_token.clone();
		tokens.generation += 1;
	}

	async fn persist_pair(&self, pair: &TokenPair) -> Result<(), StoreError> {
		self.store
			.set_tokens(pair.access_token.expose(), pair.refresh_token.as_ref().map(TokenSecret::expose))
			.await
	}

	fn clear_memory(&self) {
		let mut tokens = self.tokens.write();

		tokens.access_token = None;
		tokens.refresh_token = None;
		tokens.generation += 1;
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let tokens = self.tokens.read();

		f.debug_struct("Session")
			.field("authenticated", &tokens.access_token.is_some())
			.field("has_refresh_token", &tokens.refresh_token.is_some())
			.field("generation", &tokens.generation)
			.finish()
	}
}

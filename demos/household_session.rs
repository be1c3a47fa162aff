//! Runs a household session against an in-process API that expires the first access token.
//!
//! 1. Log in, which stores an access/refresh pair in a [`MemoryStore`].
//! 2. Fire three requests at once; the fake API rejects the first token with `401`.
//! 3. Watch a single refresh renew the pair while every request replays with the new token.

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use color_eyre::Result;
use reqwest::{Method, StatusCode};
use url::Url;
// self
use bearer_session::{
	auth::Credentials,
	client::AuthenticatedClient,
	config::SessionConfig,
	error::TransportError,
	http::{HttpResponse, HttpTransport, OutboundRequest, TransportFuture},
	session::{LogoutEvent, Session},
	store::MemoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = SessionConfig::builder(Url::parse("https://krisefikser.example.no/api/")?).build()?;
	let store = Arc::new(MemoryStore::default());
	let on_logout = |event: &LogoutEvent| {
		println!("Logged out ({}); redirecting to {}.", event.reason.as_str(), event.redirect_to);
	};
	let session = Arc::new(Session::restore(store.clone(), Arc::new(on_logout)).await?);
	let api = Arc::new(FakeApi::default());
	let client = AuthenticatedClient::<FakeApi>::with_transport(config, session, api.clone())?;

	client.login(&Credentials::new("ola@example.no", "beredskap")).await?;

	let (households, inventory, events) = tokio::join!(
		client.send(client.request(Method::GET, "households")?),
		client.send(client.request(Method::GET, "inventory")?),
		client.send(client.request(Method::GET, "events")?),
	);

	for response in [households?, inventory?, events?] {
		println!("{} -> {}", response.url.path(), response.text());
	}

	println!(
		"Refresh calls: {}; stored access token: {:?}.",
		api.refreshes.load(Ordering::Relaxed),
		store.snapshot().map(|tokens| tokens.access_token.expose().to_owned()),
	);

	client.logout().await?;

	Ok(())
}

/// Issues `A1` on login, rejects it everywhere, and swaps it for `A2` on refresh.
#[derive(Default)]
struct FakeApi {
	refreshes: AtomicUsize,
}
impl FakeApi {
	fn answer(&self, request: &OutboundRequest) -> (StatusCode, String) {
		match (request.url.path(), request.authorization()) {
			("/api/auth/login", _) =>
				(StatusCode::OK, r#"{"accessToken":"A1","refreshToken":"RT1"}"#.into()),
			("/api/auth/refresh", _) => {
				self.refreshes.fetch_add(1, Ordering::Relaxed);

				(StatusCode::OK, r#"{"accessToken":"A2","refreshToken":"RT2"}"#.into())
			},
			(path, Some("Bearer A2")) => (StatusCode::OK, format!("[] from {path}")),
			_ => (StatusCode::UNAUTHORIZED, String::new()),
		}
	}
}
impl HttpTransport for FakeApi {
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		let (status, body) = self.answer(&request);
		Box::pin(async move { Ok::<_, TransportError>(HttpResponse::new(status, request.url, body)) })
	}
}

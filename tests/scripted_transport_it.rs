// std
use std::{
	future,
	sync::atomic::{AtomicBool, Ordering},
	time::Duration,
};
// crates.io
use tokio::{sync::Notify, time};
// self
use bearer_session::{
	_preludet::*,
	auth::TokenSecret,
	client::AuthenticatedClient,
	error::{RefreshError, TransportError},
	http::{HttpResponse, HttpTransport, OutboundRequest, TransportFuture},
	session::{LogoutReason, Session},
	store::{MemoryStore, StoreError, StoreFuture, TokenStore},
};

const BASE: &str = "https://api.krisefikser.test/api/";
const REFRESH: &str = "/api/auth/refresh";

type Reply = Result<HttpResponse, TransportError>;
type Responder =
	Box<dyn Fn(OutboundRequest) -> Pin<Box<dyn Future<Output = Reply> + Send>> + Send + Sync>;

/// In-process transport answering from a script and recording every request it saw.
struct ScriptedTransport {
	respond: Responder,
	seen: Mutex<Vec<OutboundRequest>>,
}
impl ScriptedTransport {
	fn new<F, Fut>(respond: F) -> Self
	where
		F: 'static + Send + Sync + Fn(OutboundRequest) -> Fut,
		Fut: 'static + Send + Future<Output = Reply>,
	{
		Self { respond: Box::new(move |request| Box::pin(respond(request))), seen: Default::default() }
	}

	fn calls_to(&self, path: &str) -> usize {
		self.seen.lock().iter().filter(|request| request.url.path() == path).count()
	}

	fn requests_to(&self, path: &str) -> Vec<OutboundRequest> {
		self.seen.lock().iter().filter(|request| request.url.path() == path).cloned().collect()
	}
}
impl HttpTransport for ScriptedTransport {
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		self.seen.lock().push(request.clone());

		(self.respond)(request)
	}
}

type ScriptedClient = AuthenticatedClient<ScriptedTransport>;

/// Memory store whose writes or clears can be switched to fail.
#[derive(Default)]
struct FlakyStore {
	inner: MemoryStore,
	fail_writes: AtomicBool,
	fail_clears: AtomicBool,
}
impl FlakyStore {
	fn disk_full<'a>() -> StoreFuture<'a, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "disk full".into() }) })
	}
}
impl TokenStore for FlakyStore {
	fn access_token(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		self.inner.access_token()
	}

	fn refresh_token(&self) -> StoreFuture<'_, Option<TokenSecret>> {
		self.inner.refresh_token()
	}

	fn set_tokens<'a>(&'a self, access: &'a str, refresh: Option<&'a str>) -> StoreFuture<'a, ()> {
		if self.fail_writes.load(Ordering::Relaxed) {
			return Self::disk_full();
		}

		self.inner.set_tokens(access, refresh)
	}

	fn clear_tokens(&self) -> StoreFuture<'_, ()> {
		if self.fail_clears.load(Ordering::Relaxed) {
			return Self::disk_full();
		}

		self.inner.clear_tokens()
	}
}

fn reply(request: &OutboundRequest, status: u16, body: &str) -> Reply {
	let status = StatusCode::from_u16(status).expect("Scripted status code should be valid.");

	Ok(HttpResponse::new(status, request.url.clone(), body.to_owned()))
}

fn pair_body(access: &str, refresh: &str) -> String {
	format!("{{\"accessToken\":\"{access}\",\"refreshToken\":\"{refresh}\"}}")
}

async fn scripted_client(
	transport: ScriptedTransport,
	access: Option<&str>,
	refresh: Option<&str>,
) -> (ScriptedClient, Arc<ScriptedTransport>, Arc<MemoryStore>, RecordingLogout) {
	let (session, store, logout) = seeded_session(access, refresh).await;
	let transport = Arc::new(transport);
	let client = ScriptedClient::with_transport(test_config(BASE), session, transport.clone())
		.expect("Scripted client should build.");

	(client, transport, store, logout)
}

async fn flaky_client(
	transport: ScriptedTransport,
) -> (ScriptedClient, Arc<FlakyStore>, RecordingLogout) {
	let store = Arc::new(FlakyStore::default());

	store.inner.set_tokens("A1", Some("RT1")).await.expect("Seeding the store should work.");

	let logout = RecordingLogout::default();
	let session = Session::restore(store.clone(), Arc::new(logout.clone()))
		.await
		.expect("Restoring from the seeded store should work.");
	let client = ScriptedClient::with_transport(test_config(BASE), Arc::new(session), transport)
		.expect("Scripted client should build.");

	(client, store, logout)
}

fn renewing_transport() -> ScriptedTransport {
	ScriptedTransport::new(|request| async move {
		match (request.url.path(), request.authorization()) {
			(REFRESH, _) => reply(&request, 200, &pair_body("A2", "RT2")),
			(_, Some("Bearer A2")) => reply(&request, 200, "ok"),
			_ => reply(&request, 401, ""),
		}
	})
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
	time::timeout(Duration::from_secs(5), async {
		while !condition() {
			time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("Condition was not reached in time.");
}

fn get(client: &ScriptedClient, path: &str) -> OutboundRequest {
	client.request(Method::GET, path).expect("Request path should resolve against base.")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_requests_replay_once_refresh_lands() {
	let release = Arc::new(Notify::new());
	let gate = release.clone();
	let transport = ScriptedTransport::new(move |request| {
		let gate = gate.clone();

		async move {
			match (request.url.path(), request.authorization()) {
				(REFRESH, _) => {
					gate.notified().await;

					reply(&request, 200, &pair_body("A2", "RT2"))
				},
				(_, Some("Bearer A2")) => reply(&request, 200, "ok"),
				_ => reply(&request, 401, ""),
			}
		}
	});
	let (client, transport, store, logout) =
		scripted_client(transport, Some("A1"), Some("RT1")).await;
	let handles = ["households", "inventory", "events"]
		.into_iter()
		.map(|path| {
			let client = client.clone();
			let request = get(&client, path);

			tokio::spawn(async move { client.send(request).await })
		})
		.collect::<Vec<_>>();

	wait_until(|| client.pending_requests() == 2).await;
	assert!(client.is_refreshing());

	release.notify_one();

	for handle in handles {
		let response = handle
			.await
			.expect("Request task should not panic.")
			.expect("Queued request should replay successfully.");

		assert_eq!(response.text(), "ok");
	}

	assert_eq!(transport.calls_to(REFRESH), 1);
	assert_eq!(client.refresh_metrics().replayed(), 2);
	assert_eq!(client.pending_requests(), 0);
	assert!(!client.is_refreshing());
	assert_eq!(logout.count(), 0);

	let snapshot = store.snapshot().expect("Refreshed pair should be stored.");

	assert_eq!(snapshot.access_token.expose(), "A2");
	assert_eq!(snapshot.refresh_token.as_ref().map(|token| token.expose()), Some("RT2"));
}

#[tokio::test]
async fn refresh_request_carries_refresh_token_and_no_bearer() {
	let transport = ScriptedTransport::new(|request| async move {
		match (request.url.path(), request.authorization()) {
			(REFRESH, _) => reply(&request, 200, &pair_body("A2", "RT2")),
			(_, Some("Bearer A2")) => reply(&request, 200, "{}"),
			_ => reply(&request, 401, ""),
		}
	});
	let (client, transport, _store, _logout) =
		scripted_client(transport, Some("A1"), Some("RT1")).await;

	client.send(get(&client, "me")).await.expect("Request should recover after refresh.");

	let refresh = transport.requests_to(REFRESH);

	assert_eq!(refresh.len(), 1);
	assert_eq!(refresh[0].method, Method::POST);
	assert_eq!(refresh[0].authorization(), None);

	let body: serde_json::Value = serde_json::from_slice(
		refresh[0].body.as_deref().expect("Refresh request should carry a body."),
	)
	.expect("Refresh body should be JSON.");

	assert_eq!(body, serde_json::json!({ "refreshToken": "RT1" }));

	let replays = transport
		.requests_to("/api/me")
		.into_iter()
		.map(|request| request.authorization().map(str::to_owned))
		.collect::<Vec<_>>();

	assert_eq!(replays, [Some("Bearer A1".to_owned()), Some("Bearer A2".to_owned())]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_unauthorized_after_refresh_reuses_new_token() {
	let hold = Arc::new(Notify::new());
	let slow = hold.clone();
	let transport = ScriptedTransport::new(move |request| {
		let slow = slow.clone();

		async move {
			match (request.url.path(), request.authorization()) {
				(REFRESH, _) => reply(&request, 200, &pair_body("A2", "RT2")),
				(_, Some("Bearer A2")) => reply(&request, 200, "ok"),
				("/api/slow", _) => {
					slow.notified().await;

					reply(&request, 401, "")
				},
				_ => reply(&request, 401, ""),
			}
		}
	});
	let (client, transport, _store, _logout) =
		scripted_client(transport, Some("A1"), Some("RT1")).await;
	let late = {
		let client = client.clone();
		let request = get(&client, "slow");

		tokio::spawn(async move { client.send(request).await })
	};

	wait_until(|| transport.calls_to("/api/slow") == 1).await;

	client.send(get(&client, "fast")).await.expect("Fast request should recover.");
	hold.notify_one();

	let response = late
		.await
		.expect("Late request task should not panic.")
		.expect("Late request should replay with the renewed token.");

	assert_eq!(response.text(), "ok");
	assert_eq!(transport.calls_to(REFRESH), 1);
	assert_eq!(client.refresh_metrics().attempts(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_unauthorized_after_failed_refresh_reports_session_ended() {
	let hold = Arc::new(Notify::new());
	let slow = hold.clone();
	let transport = ScriptedTransport::new(move |request| {
		let slow = slow.clone();

		async move {
			match request.url.path() {
				REFRESH => reply(&request, 400, "invalid refresh token"),
				"/api/slow" => {
					slow.notified().await;

					reply(&request, 401, "")
				},
				_ => reply(&request, 401, ""),
			}
		}
	});
	let (client, transport, _store, logout) =
		scripted_client(transport, Some("A1"), Some("RT1")).await;
	let late = {
		let client = client.clone();
		let request = get(&client, "slow");

		tokio::spawn(async move { client.send(request).await })
	};

	wait_until(|| transport.calls_to("/api/slow") == 1).await;

	let err = client.send(get(&client, "fast")).await.expect_err("Refresh should be rejected.");

	assert!(matches!(err, Error::Refresh(RefreshError::Rejected { status: 400, .. })));

	hold.notify_one();

	let err = late
		.await
		.expect("Late request task should not panic.")
		.expect_err("Late request must not restart the refresh.");

	assert!(matches!(err, Error::Refresh(RefreshError::SessionEnded)));
	assert_eq!(transport.calls_to(REFRESH), 1);
	assert_eq!(logout.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_refresh_releases_waiters_and_resets_gate() {
	let transport = ScriptedTransport::new(|request| async move {
		match request.url.path() {
			REFRESH => {
				future::pending::<()>().await;

				reply(&request, 200, &pair_body("never", "never"))
			},
			_ => reply(&request, 401, ""),
		}
	});
	let (client, _transport, _store, logout) =
		scripted_client(transport, Some("A1"), Some("RT1")).await;
	let leader = {
		let client = client.clone();
		let request = get(&client, "households");

		tokio::spawn(async move { client.send(request).await })
	};

	wait_until(|| client.is_refreshing()).await;

	let follower = {
		let client = client.clone();
		let request = get(&client, "inventory");

		tokio::spawn(async move { client.send(request).await })
	};

	wait_until(|| client.pending_requests() == 1).await;
	leader.abort();
	assert!(leader.await.is_err_and(|e| e.is_cancelled()));

	let err = follower
		.await
		.expect("Follower task should not panic.")
		.expect_err("Follower must not hang once the leader is gone.");

	assert!(matches!(err, Error::Refresh(RefreshError::Abandoned)));
	assert!(!client.is_refreshing());
	assert_eq!(logout.count(), 0);
	assert!(client.session().is_authenticated());
}

#[tokio::test]
async fn transport_failure_during_refresh_logs_out() {
	let transport = ScriptedTransport::new(|request| async move {
		match request.url.path() {
			REFRESH => Err(TransportError::Io(std::io::Error::new(
				std::io::ErrorKind::ConnectionReset,
				"connection reset by peer",
			))),
			_ => reply(&request, 401, ""),
		}
	});
	let (client, _transport, store, logout) =
		scripted_client(transport, Some("A1"), Some("RT1")).await;
	let err = client.send(get(&client, "households")).await.expect_err("Refresh should fail.");

	assert!(matches!(err, Error::Refresh(RefreshError::Transport(_))));
	assert_eq!(logout.count(), 1);
	assert!(store.snapshot().is_none());
}

#[tokio::test]
async fn malformed_refresh_response_logs_out() {
	let transport = ScriptedTransport::new(|request| async move {
		match request.url.path() {
			REFRESH => reply(&request, 200, "{\"accessToken\":\"A2\"}"),
			_ => reply(&request, 401, ""),
		}
	});
	let (client, _transport, _store, logout) =
		scripted_client(transport, Some("A1"), Some("RT1")).await;
	let err = client.send(get(&client, "households")).await.expect_err("Refresh should fail.");

	match err {
		Error::Refresh(RefreshError::MalformedResponse { message }) =>
			assert!(message.contains("refreshToken")),
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(logout.count(), 1);
	assert!(!client.session().is_authenticated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn logout_during_refresh_is_not_undone() {
	let release = Arc::new(Notify::new());
	let gate = release.clone();
	let transport = ScriptedTransport::new(move |request| {
		let gate = gate.clone();

		async move {
			match (request.url.path(), request.authorization()) {
				(REFRESH, _) => {
					gate.notified().await;

					reply(&request, 200, &pair_body("A2", "RT2"))
				},
				(_, Some("Bearer A2")) => reply(&request, 200, "ok"),
				_ => reply(&request, 401, ""),
			}
		}
	});
	let (client, _transport, store, logout) =
		scripted_client(transport, Some("A1"), Some("RT1")).await;
	let spawn_get = |path: &str| {
		let client = client.clone();
		let request = get(&client, path);

		tokio::spawn(async move { client.send(request).await })
	};
	let leader = spawn_get("households");

	wait_until(|| client.is_refreshing()).await;

	let follower = spawn_get("inventory");

	wait_until(|| client.pending_requests() == 1).await;
	client.logout().await.expect("Logout should succeed while a refresh is in flight.");
	assert!(!client.session().is_authenticated());

	release.notify_one();

	for handle in [leader, follower] {
		let err = handle
			.await
			.expect("Request task should not panic.")
			.expect_err("Requests must not resume a session the user ended.");

		assert!(matches!(err, Error::Refresh(RefreshError::SessionEnded)));
	}

	assert!(!client.session().is_authenticated());
	assert!(client.session().refresh_token().is_none());
	assert!(store.snapshot().is_none());
	assert!(!client.is_refreshing());
	assert_eq!(client.refresh_metrics().failures(), 1);

	let events = logout.events();

	assert_eq!(events.len(), 1);
	assert!(matches!(events[0].reason, LogoutReason::UserInitiated));
}

#[tokio::test]
async fn refresh_succeeds_when_the_store_cannot_persist_it() {
	let (client, store, logout) = flaky_client(renewing_transport()).await;

	store.fail_writes.store(true, Ordering::Relaxed);

	let response = client
		.send(get(&client, "households"))
		.await
		.expect("A failed durable write must not fail the request.");

	assert_eq!(response.text(), "ok");
	assert_eq!(client.session().access_token().map(|t| t.expose().to_owned()), Some("A2".into()));
	assert_eq!(
		client.session().refresh_token().map(|t| t.expose().to_owned()),
		Some("RT2".into()),
	);
	assert_eq!(
		store.inner.snapshot().map(|tokens| tokens.access_token.expose().to_owned()),
		Some("A1".into()),
	);
	assert_eq!(client.refresh_metrics().successes(), 1);
	assert_eq!(logout.count(), 0);
}

#[tokio::test]
async fn logout_notifies_even_when_the_store_cannot_be_cleared() {
	let (client, store, logout) = flaky_client(renewing_transport()).await;

	store.fail_clears.store(true, Ordering::Relaxed);

	let err = client.logout().await.expect_err("A failed clear should be reported.");

	assert!(matches!(err, Error::Storage(StoreError::Backend { .. })));
	assert_eq!(logout.count(), 1);
	assert!(!client.session().is_authenticated());
	assert!(store.inner.snapshot().is_some());
}

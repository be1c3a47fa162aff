// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use bearer_session::{_preludet::{Method, *}, auth::Credentials, session::LogoutReason};

const LOGIN: &str = "/api/auth/login";

#[tokio::test]
async fn login_stores_issued_pair() {
	let server = MockServer::start_async().await;
	let (client, store, logout) =
		build_reqwest_test_client(&server.url("/api/"), None, None).await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(LOGIN)
				.header_missing("authorization")
				.json_body(json!({ "email": "ola@example.no", "password": "hunter2" }));
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"accessToken\":\"A1\",\"refreshToken\":\"RT1\"}");
		})
		.await;
	let me = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/users/me").header("authorization", "Bearer A1");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"email\":\"ola@example.no\"}");
		})
		.await;
	let pair = client
		.login(&Credentials::new("ola@example.no", "hunter2"))
		.await
		.expect("Login should succeed.");

	assert_eq!(pair.access_token.expose(), "A1");
	assert!(client.session().is_authenticated());

	let snapshot = store.snapshot().expect("Login should persist the pair.");

	assert_eq!(snapshot.refresh_token.as_ref().map(|token| token.expose()), Some("RT1"));

	let profile: serde_json::Value = client
		.send_json(client.request(Method::GET, "users/me").expect("Path should resolve."))
		.await
		.expect("Profile should decode.");

	assert_eq!(profile["email"], "ola@example.no");
	login.assert_async().await;
	me.assert_async().await;
	assert_eq!(logout.count(), 0);
}

#[tokio::test]
async fn failed_login_clears_previous_tokens_without_logout_event() {
	let server = MockServer::start_async().await;
	let (client, store, logout) =
		build_reqwest_test_client(&server.url("/api/"), Some("OLD"), Some("RT-OLD")).await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path(LOGIN);
			then.status(401).body("Invalid email or password");
		})
		.await;
	let err = client
		.login(&Credentials::new("ola@example.no", "wrong"))
		.await
		.expect_err("Login with bad credentials must fail.");

	assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
	login.assert_calls_async(1).await;
	assert!(!client.session().is_authenticated());
	assert!(client.session().refresh_token().is_none());
	assert!(store.snapshot().is_none());
	assert_eq!(logout.count(), 0);
}

#[tokio::test]
async fn explicit_logout_notifies_with_login_route() {
	let server = MockServer::start_async().await;
	let (client, store, logout) =
		build_reqwest_test_client(&server.url("/api/"), Some("A1"), Some("RT1")).await;

	client.logout().await.expect("Logout should succeed.");

	assert!(!client.session().is_authenticated());
	assert!(store.snapshot().is_none());

	let events = logout.events();

	assert_eq!(events.len(), 1);
	assert!(matches!(events[0].reason, LogoutReason::UserInitiated));
	assert_eq!(events[0].redirect_to, "/logg-inn");
}

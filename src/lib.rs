//! Authenticated HTTP session for the household preparedness API: bearer injection, single-flight
//! token refresh on `401`, replay of queued callers, and logout when the refresh fails.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		client::AuthenticatedClient,
		config::SessionConfig,
		http::ReqwestTransport,
		session::{LogoutEvent, LogoutHandler, Session},
		store::{MemoryStore, TokenStore},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = AuthenticatedClient<ReqwestTransport>;

	/// Logout collaborator that records every event it receives.
	#[derive(Clone, Debug, Default)]
	pub struct RecordingLogout(Arc<Mutex<Vec<LogoutEvent>>>);
	impl RecordingLogout {
		/// Returns how many times logout was invoked.
		pub fn count(&self) -> usize {
			self.0.lock().len()
		}

		/// Returns a copy of the recorded events.
		pub fn events(&self) -> Vec<LogoutEvent> {
			self.0.lock().clone()
		}
	}
	impl LogoutHandler for RecordingLogout {
		fn logged_out(&self, event: &LogoutEvent) {
			self.0.lock().push(event.clone());
		}
	}

	/// Builds a [`SessionConfig`] pointing at the provided base URL.
	pub fn test_config(base_url: &str) -> SessionConfig {
		SessionConfig::builder(
			Url::parse(base_url).expect("Failed to parse test base URL for session config."),
		)
		.build()
		.expect("Test session config should build successfully.")
	}

	/// Seeds a memory store with the provided tokens and restores a [`Session`] from it.
	pub async fn seeded_session(
		access: Option<&str>,
		refresh: Option<&str>,
	) -> (Arc<Session>, Arc<MemoryStore>, RecordingLogout) {
		let store = Arc::new(MemoryStore::default());

		if let Some(access) = access {
			store
				.set_tokens(access, refresh)
				.await
				.expect("Failed to seed tokens into the memory store.");
		}

		let logout = RecordingLogout::default();
		let session = Session::restore(store.clone(), Arc::new(logout.clone()))
			.await
			.expect("Failed to restore session from the seeded memory store.");

		(Arc::new(session), store, logout)
	}

	/// Constructs a reqwest-backed client over a seeded memory store.
	pub async fn build_reqwest_test_client(
		base_url: &str,
		access: Option<&str>,
		refresh: Option<&str>,
	) -> (ReqwestTestClient, Arc<MemoryStore>, RecordingLogout) {
		let (session, store, logout) = seeded_session(access, refresh).await;
		let config = test_config(base_url);
		let client = AuthenticatedClient::new(config, session)
			.expect("Failed to build reqwest-backed test client.");

		(client, store, logout)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{
		Client as ReqwestClient, Error as ReqwestError, Method, StatusCode,
		header::{HeaderMap, HeaderName, HeaderValue},
	};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {bearer_session as _, color_eyre as _, httpmock as _};

//! Authenticated request pipeline with single-flight token refresh.
//!
//! [`AuthenticatedClient::send`] attaches the session's bearer token, and when the server
//! answers `401` it renews the pair once for the whole burst of failing requests:
//!
//! - the first failing request leads the refresh against `POST /auth/refresh`;
//! - requests failing while that refresh is in flight queue behind it and replay with the new
//!   token once it lands;
//! - if the refresh fails (or there is no refresh token), the session is logged out once and
//!   every caller receives the same [`RefreshError`].
//!
//! Each request is retried at most once, and `401`s from the refresh endpoint itself never
//! start another refresh.

mod metrics;
mod refresh;

pub use metrics::RefreshMetrics;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{
		Credentials, LoginResponseBody, PasswordChange, PasswordUpdate, RefreshResponseBody,
		Registration, TokenPair, TokenSecret, User,
	},
	config::SessionConfig,
	error::RefreshError,
	http::{HttpResponse, HttpTransport, OutboundRequest, ReqwestTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::{LogoutReason, Renewal, Session},
};
use refresh::{RefreshGate, Ticket};

/// Request wrapper carrying how many times it has been replayed after a refresh.
#[derive(Clone, Debug)]
pub(crate) struct Attempt {
	request: OutboundRequest,
	retries: u8,
}
impl Attempt {
	const MAX_RETRIES: u8 = 1;

	fn first(request: OutboundRequest) -> Self {
		Self { request, retries: 0 }
	}

	fn retried(self) -> Self {
		Self { request: self.request, retries: self.retries + 1 }
	}

	fn can_retry(&self) -> bool {
		self.retries < Self::MAX_RETRIES
	}
}

/// HTTP client that authenticates every request through a shared [`Session`].
///
/// Clones share the session, the transport, and the refresh gate, so single-flight holds
/// across every clone.
pub struct AuthenticatedClient<T = ReqwestTransport>
where
	T: HttpTransport,
{
	config: Arc<SessionConfig>,
	session: Arc<Session>,
	transport: Arc<T>,
	default_headers: HeaderMap,
	refresh_url: Url,
	login_url: Url,
	register_url: Url,
	password_url: Url,
	me_url: Url,
	gate: Arc<RefreshGate>,
	refresh_metrics: Arc<RefreshMetrics>,
}
impl AuthenticatedClient<ReqwestTransport> {
	/// Creates a client backed by a reqwest transport built from `config`.
	pub fn new(config: SessionConfig, session: Arc<Session>) -> Result<Self> {
		let transport = ReqwestTransport::from_config(&config)?;

		Self::with_transport(config, session, transport)
	}
}
impl<T> AuthenticatedClient<T>
where
	T: HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		config: SessionConfig,
		session: Arc<Session>,
		transport: impl Into<Arc<T>>,
	) -> Result<Self> {
		let default_headers = config.header_map()?;
		let refresh_url = config.refresh_url()?;
		let login_url = config.login_url()?;
		let register_url = config.endpoint(&config.register_path)?;
		let password_url = config.endpoint(&config.password_path)?;
		let me_url = config.endpoint(&config.me_path)?;

		Ok(Self {
			config: Arc::new(config),
			session,
			transport: transport.into(),
			default_headers,
			refresh_url,
			login_url,
			register_url,
			password_url,
			me_url,
			gate: Default::default(),
			refresh_metrics: Default::default(),
		})
	}

	/// Active configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Shared session holding the token pair.
	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	/// Underlying transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	/// Counters for refresh cycles run by this client and its clones.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.refresh_metrics
	}

	/// Returns `true` while a refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.gate.is_refreshing()
	}

	/// Number of requests queued behind the in-flight refresh.
	pub fn pending_requests(&self) -> usize {
		self.gate.pending()
	}

	/// Builds a request for `path`, resolved against the configured base URL.
	pub fn request(&self, method: Method, path: &str) -> Result<OutboundRequest> {
		Ok(OutboundRequest::new(method, self.config.endpoint(path)?))
	}

	/// Sends `request` with the session's bearer token, refreshing once on `401`.
	///
	/// Non-success responses that are not recovered come back as
	/// [`Error::Status`](crate::error::Error::Status); an unrecoverable session comes back as
	/// [`Error::Refresh`](crate::error::Error::Refresh) after the session was logged out.
	pub async fn send(&self, request: OutboundRequest) -> Result<HttpResponse> {
		const KIND: FlowKind = FlowKind::Send;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let attempt = Attempt::first(request.with_default_headers(&self.default_headers));
		let result = span.instrument(self.send_attempt(attempt)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Sends `request` and decodes the JSON response body.
	pub async fn send_json<R>(&self, request: OutboundRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send(request).await?.json()
	}

	/// Exchanges credentials for a token pair and stores it in the session.
	///
	/// On failure any partially stored tokens are cleared; the logout handler is not notified.
	pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let request = OutboundRequest::post(self.login_url.clone())
					.json(credentials)?
					.with_default_headers(&self.default_headers);
				let response = self.transport.execute(request).await?.error_for_status()?;
				let pair = TokenPair::from(response.json::<LoginResponseBody>()?);

				self.session.update_tokens(&pair).await?;

				Ok::<_, Error>(pair)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => {
				if let Err(e) = self.session.clear().await {
					obs::warn_swallowed(KIND, "Failed to clear tokens after a failed login.", &e);
				}

				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	/// Creates an account. The session is left untouched; call [`Self::login`] afterwards.
	pub async fn register(&self, registration: &Registration) -> Result<()> {
		const KIND: FlowKind = FlowKind::Register;

		let span = FlowSpan::new(KIND, "register");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let request = OutboundRequest::post(self.register_url.clone())
					.json(registration)?
					.with_default_headers(&self.default_headers);

				self.transport.execute(request).await?.error_for_status()?;

				Ok::<_, Error>(())
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Changes the signed-in user's password.
	pub async fn update_password(&self, change: &PasswordChange) -> Result<PasswordUpdate> {
		self.send_json(OutboundRequest::post(self.password_url.clone()).json(change)?).await
	}

	/// Fetches the signed-in user, including their roles.
	pub async fn current_user(&self) -> Result<User> {
		self.send_json(OutboundRequest::get(self.me_url.clone())).await
	}

	/// Ends the session and notifies the logout handler.
	pub async fn logout(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(self.session.logout(LogoutReason::UserInitiated, &self.config.login_route))
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		Ok(result?)
	}

	async fn send_attempt(&self, attempt: Attempt) -> Result<HttpResponse> {
		let credential = self.session.credential();
		let response = self.dispatch(&attempt, credential.access_token.as_ref()).await?;

		if !self.should_renew(&attempt, &response) {
			return Ok(response.error_for_status()?);
		}

		obs::note(FlowKind::Send, "Access token rejected; renewing before replay.");

		let retry = attempt.retried();
		let token = self.renew(credential.generation).await?;
		let response = self.dispatch(&retry, Some(&token)).await?;

		Ok(response.error_for_status()?)
	}

	async fn dispatch(
		&self,
		attempt: &Attempt,
		token: Option<&TokenSecret>,
	) -> Result<HttpResponse> {
		let request = attempt.request.with_bearer(token);

		Ok(self.transport.execute(request).await?)
	}

	fn should_renew(&self, attempt: &Attempt, response: &HttpResponse) -> bool {
		response.status == StatusCode::UNAUTHORIZED
			&& attempt.can_retry()
			&& !self.is_refresh_endpoint(&attempt.request.url)
	}

	fn is_refresh_endpoint(&self, url: &Url) -> bool {
		url.origin() == self.refresh_url.origin()
			&& url.path().trim_end_matches('/') == self.refresh_url.path().trim_end_matches('/')
	}

	/// Returns an access token newer than the one from `stale_generation`.
	async fn renew(&self, stale_generation: u64) -> Result<TokenSecret> {
		let ticket = self.gate.enter(|| {
			let current = self.session.credential();

			(current.generation != stale_generation).then_some(current.access_token)
		});

		match ticket {
			Ticket::Current(Some(token)) => Ok(token),
			Ticket::Current(None) => Err(RefreshError::SessionEnded.into()),
			Ticket::Wait(waiter) => {
				obs::note(FlowKind::Refresh, "Refresh in flight; queued behind it.");

				Ok(waiter.wait().await?)
			},
			Ticket::Lead(flight) => {
				let outcome = self.refresh_tokens().await;
				let woken = flight.settle(outcome.clone());

				self.refresh_metrics.record_replayed(woken);
				obs::record_replayed(woken, outcome.is_ok());

				Ok(outcome?)
			},
		}
	}

	/// Runs one refresh cycle: exchange, install, or log out on failure.
	///
	/// The pair is only installed if the session is still at the generation the refresh token
	/// was read from. Otherwise the newer session state wins: its access token is handed out,
	/// or [`RefreshError::SessionEnded`] when it was logged out in the meantime.
	async fn refresh_tokens(&self) -> Result<TokenSecret, RefreshError> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_tokens");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span
			.instrument(async {
				let (refresh_token, generation) = self.session.refresh_grant();
				let refresh_token = refresh_token.ok_or(RefreshError::MissingRefreshToken)?;
				let pair = self.exchange_refresh_token(&refresh_token).await?;

				match self.session.renew_tokens(generation, &pair).await {
					Renewal::Applied(stored) => {
						if let Err(e) = stored {
							obs::warn_swallowed(KIND, "Failed to persist refreshed tokens.", &e);
						}

						Ok(pair.access_token)
					},
					Renewal::Superseded(Some(current)) => {
						obs::note(KIND, "Session changed during refresh; discarding the new pair.");

						Ok(current)
					},
					Renewal::Superseded(None) => Err(RefreshError::SessionEnded),
				}
			})
			.await;

		match &result {
			Ok(_) => {
				self.refresh_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(RefreshError::SessionEnded) => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
			Err(err) => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				let reason = LogoutReason::RefreshFailed(err.clone());

				if let Err(e) = self.session.logout(reason, &self.config.login_route).await {
					obs::warn_swallowed(KIND, "Failed to clear tokens during logout.", &e);
				}
			},
		}

		result
	}

	async fn exchange_refresh_token(
		&self,
		refresh_token: &TokenSecret,
	) -> Result<TokenPair, RefreshError> {
		let body = serde_json::json!({ "refreshToken": refresh_token.expose() });
		let request = OutboundRequest::post(self.refresh_url.clone())
			.with_json_value(&body)
			.with_default_headers(&self.default_headers);
		let response = self.transport.execute(request).await?;

		if !response.is_success() {
			return Err(RefreshError::Rejected {
				status: response.status.as_u16(),
				body: response.text(),
			});
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&response.body);
		let body: RefreshResponseBody = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| RefreshError::MalformedResponse { message: e.to_string() })?;

		Ok(body.into())
	}
}
impl<T> Clone for AuthenticatedClient<T>
where
	T: HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			session: self.session.clone(),
			transport: self.transport.clone(),
			default_headers: self.default_headers.clone(),
			refresh_url: self.refresh_url.clone(),
			login_url: self.login_url.clone(),
			register_url: self.register_url.clone(),
			password_url: self.password_url.clone(),
			me_url: self.me_url.clone(),
			gate: self.gate.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
		}
	}
}
impl<T> Debug for AuthenticatedClient<T>
where
	T: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticatedClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("session", &self.session)
			.field("refreshing", &self.gate.is_refreshing())
			.finish()
	}
}

//! Logout collaborator contract.

// self
use crate::{_prelude::*, error::RefreshError};

/// Why the session ended.
#[derive(Clone, Debug)]
pub enum LogoutReason {
	/// The application asked for it.
	UserInitiated,
	/// The access token expired and the session could not be renewed.
	RefreshFailed(RefreshError),
}
impl LogoutReason {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::UserInitiated => "user_initiated",
			Self::RefreshFailed(_) => "refresh_failed",
		}
	}
}

/// Notification handed to the [`LogoutHandler`] after tokens were cleared.
#[derive(Clone, Debug)]
pub struct LogoutEvent {
	/// Why the session ended.
	pub reason: LogoutReason,
	/// Client-side route the user should be sent to.
	pub redirect_to: String,
}

/// Receives logout notifications, typically to route the user back to the login page.
pub trait LogoutHandler
where
	Self: Send + Sync,
{
	/// Called once per logout, after the session and durable store were cleared.
	fn logged_out(&self, event: &LogoutEvent);
}
impl<F> LogoutHandler for F
where
	F: Send + Sync + Fn(&LogoutEvent),
{
	fn logged_out(&self, event: &LogoutEvent) {
		self(event)
	}
}

/// Handler that ignores logout notifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogout;
impl LogoutHandler for NoopLogout {
	fn logged_out(&self, _: &LogoutEvent) {}
}

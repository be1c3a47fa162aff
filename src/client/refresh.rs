//! Single-flight gate guarding token renewal.
//!
//! The gate is either idle or has exactly one refresh in flight. The first caller to enter an
//! idle gate becomes the leader and receives a [`Flight`]; everyone entering while it is in
//! flight is queued as a [`PendingRequest`] and woken with the leader's outcome.

// std
use std::mem;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, auth::TokenSecret, error::RefreshError};

/// Result handed to every caller of a refresh cycle.
pub(crate) type RefreshOutcome = Result<TokenSecret, RefreshError>;

/// Suspended caller waiting on the in-flight refresh.
struct PendingRequest {
	continuation: oneshot::Sender<RefreshOutcome>,
}

#[derive(Default)]
struct GateState {
	in_flight: bool,
	pending: Vec<PendingRequest>,
}

/// What a caller should do after an authorization failure.
pub(crate) enum Ticket<'a> {
	/// Perform the refresh and settle the flight.
	Lead(Flight<'a>),
	/// Wait for the in-flight refresh.
	Wait(Waiter),
	/// The token pair changed since the request was sent; use this token (or give up if the
	/// session was logged out).
	Current(Option<TokenSecret>),
}

#[derive(Default)]
pub(crate) struct RefreshGate {
	state: Mutex<GateState>,
}
impl RefreshGate {
	/// Joins the in-flight refresh, or starts one unless `moved_on` reports a newer token.
	///
	/// `moved_on` runs under the gate lock, so it cannot interleave with a leader settling.
	pub(crate) fn enter<F>(&self, moved_on: F) -> Ticket<'_>
	where
		F: FnOnce() -> Option<Option<TokenSecret>>,
	{
		let mut state = self.state.lock();

		if state.in_flight {
			let (continuation, receiver) = oneshot::channel();

			state.pending.push(PendingRequest { continuation });

			return Ticket::Wait(Waiter(receiver));
		}
		if let Some(current) = moved_on() {
			return Ticket::Current(current);
		}

		state.in_flight = true;

		Ticket::Lead(Flight { gate: self, settled: false })
	}

	pub(crate) fn is_refreshing(&self) -> bool {
		self.state.lock().in_flight
	}

	pub(crate) fn pending(&self) -> usize {
		self.state.lock().pending.len()
	}

	fn settle(&self, outcome: RefreshOutcome) -> usize {
		let pending = {
			let mut state = self.state.lock();

			state.in_flight = false;

			mem::take(&mut state.pending)
		};
		let woken = pending.len();

		for request in pending {
			// Receiver gone means the caller was cancelled; nothing to deliver.
			let _ = request.continuation.send(outcome.clone());
		}

		woken
	}
}

/// Queued caller's half of a [`PendingRequest`].
pub(crate) struct Waiter(oneshot::Receiver<RefreshOutcome>);
impl Waiter {
	pub(crate) async fn wait(self) -> RefreshOutcome {
		self.0.await.unwrap_or(Err(RefreshError::Abandoned))
	}
}

/// Leader's handle on the in-flight refresh. Dropping it unsettled rejects every waiter with
/// [`RefreshError::Abandoned`] and returns the gate to idle.
pub(crate) struct Flight<'a> {
	gate: &'a RefreshGate,
	settled: bool,
}
impl Flight<'_> {
	/// Returns the gate to idle and wakes every queued caller; yields how many were woken.
	pub(crate) fn settle(mut self, outcome: RefreshOutcome) -> usize {
		self.settled = true;

		self.gate.settle(outcome)
	}
}
impl Drop for Flight<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.gate.settle(Err(RefreshError::Abandoned));
		}
	}
}

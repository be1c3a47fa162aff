// self
use crate::{
	obs::{FlowKind, FlowOutcome},
	session::LogoutReason,
};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_session_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts session terminations, labeled by why the session ended.
pub fn record_logout(reason: &LogoutReason) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("bearer_session_logout_total", "reason" => reason.as_str()).increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = reason;
	}
}

/// Counts queued requests woken by a settled refresh, labeled by whether it produced a token.
pub fn record_replayed(woken: usize, renewed: bool) {
	#[cfg(feature = "metrics")]
	{
		let outcome = if renewed { "renewed" } else { "rejected" };

		metrics::counter!("bearer_session_replayed_total", "outcome" => outcome)
			.increment(woken as u64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (woken, renewed);
	}
}

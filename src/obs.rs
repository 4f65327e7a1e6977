//! Observability helpers for lifecycle flows.
//!
//! Spans are always emitted through `tracing` as `addon_broker.lifecycle`,
//! tagged with the `event` (lifecycle kind) and `stage` (call site) fields.
//! Enable the `metrics` feature to additionally increment the
//! `addon_broker_lifecycle_total` counter for every attempt/success/failure,
//! labeled by `event` + `outcome`.

// self
use crate::_prelude::*;

/// Lifecycle events observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
	/// Install webhook handling.
	Install,
	/// Update webhook handling.
	Update,
	/// Uninstall webhook handling.
	Remove,
	/// Tenant token lookup/exchange.
	TokenLookup,
}
impl LifecycleKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LifecycleKind::Install => "install",
			LifecycleKind::Update => "update",
			LifecycleKind::Remove => "remove",
			LifecycleKind::TokenLookup => "token_lookup",
		}
	}
}
impl Display for LifecycleKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleOutcome {
	/// Entry to a broker operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller (or swallowed best-effort work).
	Failure,
}
impl LifecycleOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LifecycleOutcome::Attempt => "attempt",
			LifecycleOutcome::Success => "success",
			LifecycleOutcome::Failure => "failure",
		}
	}
}
impl Display for LifecycleOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// A span builder used by lifecycle flows.
#[derive(Clone, Debug)]
pub struct LifecycleSpan {
	span: tracing::Span,
}
impl LifecycleSpan {
	/// Creates a new span tagged with the provided event kind + stage.
	pub fn new(kind: LifecycleKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("addon_broker.lifecycle", event = kind.as_str(), stage) }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> tracing::instrument::Instrumented<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

/// Records a lifecycle outcome via the global metrics recorder (when enabled).
pub fn record_lifecycle_outcome(kind: LifecycleKind, outcome: LifecycleOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"addon_broker_lifecycle_total",
			"event" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

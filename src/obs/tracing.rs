// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// How the stored access token looked when a request was prepared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
	/// Nothing stored.
	Missing,
	/// Decodable and not yet expired.
	Usable,
	/// Decodable but past its `exp` (or inside the leeway window).
	Expired,
	/// Not a decodable JWT or no `exp` claim; treated as expired.
	Unreadable,
}
impl TokenState {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenState::Missing => "missing",
			TokenState::Usable => "usable",
			TokenState::Expired => "expired",
			TokenState::Unreadable => "unreadable",
		}
	}
}

/// A span builder used by client flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"storefront_auth.flow",
				flow = kind.as_str(),
				stage,
				token = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Records the state of the access token the flow is about to use.
	pub fn record_token_state(&self, state: TokenState) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("token", state.as_str());
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = state;
		}
	}

	/// Emits a warning inside the span for a store operation that failed but does not abort
	/// the flow.
	pub fn record_store_failure(&self, operation: &'static str, err: &dyn StdError) {
		#[cfg(feature = "tracing")]
		{
			tracing::warn!(parent: &self.span, operation, error = %err, "token store operation failed");
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (operation, err);
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

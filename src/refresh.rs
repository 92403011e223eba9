//! Single-flight refresh coordination.
//!
//! [`RefreshCoordinator::refresh`] guarantees that at most one call to the refresh endpoint is
//! in flight at any time. The coordinator is either idle or running one refresh cycle; callers
//! that arrive while a cycle runs join it as waiters and receive the cycle's outcome (the new
//! access token, or the shared [`RefreshError`]). The cycle slot is cleared before the outcome
//! is published, so a caller arriving after that point starts a fresh cycle instead of reusing
//! a settled result.
//!
//! Successful cycles rotate the stored pair via [`TokenStore::compare_and_swap`]; failed cycles
//! clear the store, because a session whose refresh failed cannot be recovered.

mod metrics;

pub use self::metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
// crates.io
use http::Method;
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	error::TransportError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{CompareAndSwapOutcome, StoreError, TokenStore},
	transport::{HttpTransport, Request},
};

type RefreshOutcome = Result<TokenSecret, RefreshError>;

/// Failure shared by every waiter of one refresh cycle.
#[derive(Clone, Debug, ThisError)]
pub enum RefreshError {
	/// No refresh token is stored; the user is not logged in.
	#[error("No refresh token is stored.")]
	MissingRefreshToken,
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the refresh token with HTTP {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// Refresh endpoint answered 2xx without a usable access token.
	#[error("Refresh endpoint returned a malformed response: {message}.")]
	MalformedResponse {
		/// Description of what was missing or unparsable.
		message: String,
	},
	/// Refresh request could not be sent or timed out.
	#[error("Transport failure while calling the refresh endpoint.")]
	Transport(#[source] Arc<TransportError>),
	/// Token store failed while reading or rotating the pair.
	#[error("Token store failed during refresh.")]
	Storage(#[source] StoreError),
	/// The session was cleared while the refresh call was in flight.
	#[error("Session ended while the refresh was in flight.")]
	SessionEnded,
}

/// Observable coordinator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshState {
	/// No refresh cycle is running.
	Idle,
	/// A refresh cycle is running; new callers join it.
	Refreshing,
}

#[derive(Deserialize)]
struct RefreshResponse {
	access: Option<String>,
	refresh: Option<String>,
}

struct RefreshCycle {
	id: u64,
	// Some caller is running (or about to run) the endpoint call for this cycle.
	driven: AtomicBool,
	outcome: AsyncOnceCell<RefreshOutcome>,
}

// Clears `driven` when the driving future completes or is dropped mid-flight.
struct Driving<'a>(&'a AtomicBool);
impl<'a> Driving<'a> {
	fn start(flag: &'a AtomicBool) -> Self {
		flag.store(true, Ordering::Release);

		Self(flag)
	}
}
impl Drop for Driving<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

/// Owns the refresh endpoint call and the idle/refreshing state.
///
/// Construct one per session store and share it (the [`AuthenticatedClient`] holds it behind
/// an `Arc`). If the caller driving a cycle is dropped mid-flight, one of the remaining waiters
/// takes the cycle over and issues the call itself, so no waiter is left pending.
///
/// [`AuthenticatedClient`]: crate::client::AuthenticatedClient
pub struct RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	store: Arc<dyn TokenStore>,
	endpoint: Url,
	metrics: Arc<RefreshMetrics>,
	current: Mutex<Option<Arc<RefreshCycle>>>,
	next_cycle: AtomicU64,
}
impl<T> RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates an idle coordinator that refreshes through `endpoint`.
	pub fn new(store: Arc<dyn TokenStore>, transport: impl Into<Arc<T>>, endpoint: Url) -> Self {
		Self {
			transport: transport.into(),
			store,
			endpoint,
			metrics: Default::default(),
			current: Mutex::new(None),
			next_cycle: AtomicU64::new(1),
		}
	}

	/// Shared counters for cycles, joins, and outcomes.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Current state of the coordinator.
	pub fn state(&self) -> RefreshState {
		if self.current.lock().is_some() { RefreshState::Refreshing } else { RefreshState::Idle }
	}

	/// Obtains a new access token, joining the running cycle if there is one.
	pub async fn refresh(&self) -> Result<TokenSecret, RefreshError> {
		let cycle = self.join_or_start();

		cycle.outcome.get_or_init(|| self.run_cycle(&cycle)).await.clone()
	}

	fn join_or_start(&self) -> Arc<RefreshCycle> {
		let mut current = self.current.lock();

		if let Some(cycle) = current.as_ref() {
			// An undriven cycle lost its leader to cancellation; this caller takes it over and
			// is counted as an attempt instead.
			if cycle.driven.load(Ordering::Acquire) {
				self.metrics.record_join();
			}

			return Arc::clone(cycle);
		}

		let id = self.next_cycle.fetch_add(1, Ordering::Relaxed);
		let cycle = Arc::new(RefreshCycle {
			id,
			driven: AtomicBool::new(true),
			outcome: AsyncOnceCell::new(),
		});

		*current = Some(Arc::clone(&cycle));

		cycle
	}

	async fn run_cycle(&self, cycle: &Arc<RefreshCycle>) -> RefreshOutcome {
		const KIND: FlowKind = FlowKind::Refresh;

		let _driving = Driving::start(&cycle.driven);
		let span = FlowSpan::new(KIND, "refresh_cycle");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let outcome = span.instrument(self.rotate()).await;

		if outcome.is_err() {
			self.end_session(&span).await;
		}

		self.settle(cycle);

		match &outcome {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(_) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		outcome
	}

	async fn end_session(&self, span: &FlowSpan) {
		if let Err(e) = self.store.clear().await {
			self.metrics.record_clear_failure();
			span.record_store_failure("clear", &e);
		}
	}

	// Returns to idle; the outcome is published to waiters right after this.
	fn settle(&self, cycle: &Arc<RefreshCycle>) {
		let mut current = self.current.lock();

		if current.as_ref().is_some_and(|running| running.id == cycle.id) {
			*current = None;
		}
	}

	async fn rotate(&self) -> RefreshOutcome {
		let pair = self
			.store
			.get()
			.await
			.map_err(RefreshError::Storage)?
			.ok_or(RefreshError::MissingRefreshToken)?;
		let (access, rotated_refresh) = self.call_endpoint(&pair.refresh).await?;
		let replacement = pair.rotated(access, rotated_refresh);

		match self
			.store
			.compare_and_swap(pair.refresh.expose(), replacement.clone())
			.await
			.map_err(RefreshError::Storage)?
		{
			CompareAndSwapOutcome::Updated => Ok(replacement.access),
			// A login replaced the session mid-flight; its token is newer than ours.
			CompareAndSwapOutcome::RefreshMismatch => self
				.store
				.get()
				.await
				.map_err(RefreshError::Storage)?
				.map(|TokenPair { access, .. }| access)
				.ok_or(RefreshError::SessionEnded),
			CompareAndSwapOutcome::Missing => Err(RefreshError::SessionEnded),
		}
	}

	async fn call_endpoint(
		&self,
		refresh: &TokenSecret,
	) -> Result<(TokenSecret, Option<TokenSecret>), RefreshError> {
		let request = Request::new(Method::POST, self.endpoint.clone())
			.json(&serde_json::json!({ "refresh": refresh.expose() }))
			.map_err(|e| RefreshError::MalformedResponse { message: e.to_string() })?;
		let response = self
			.transport
			.send(request)
			.await
			.map_err(|e| RefreshError::Transport(Arc::new(e)))?;

		if !response.is_success() {
			return Err(RefreshError::Rejected { status: response.status.as_u16() });
		}

		let body: RefreshResponse = response
			.json()
			.map_err(|e| RefreshError::MalformedResponse { message: error_chain(&e) })?;
		let access = body.access.filter(|value| !value.is_empty()).ok_or_else(|| {
			RefreshError::MalformedResponse { message: "response lacks an access token".into() }
		})?;
		let refresh = body.refresh.filter(|value| !value.is_empty()).map(TokenSecret::new);

		Ok((TokenSecret::new(access), refresh))
	}
}
impl<T> Debug for RefreshCoordinator<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("endpoint", &self.endpoint.as_str())
			.field("state", &self.state())
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn error_chain(err: &Error) -> String {
	match StdError::source(err) {
		Some(source) => format!("{err} ({source})"),
		None => err.to_string(),
	}
}

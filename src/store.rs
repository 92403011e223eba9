//! Storage contract and built-in stores for the session's token pair.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::TokenPair};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable slot holding the current session's [`TokenPair`].
///
/// The store performs no validation; it only guarantees that [`TokenStore::set`] replaces both
/// halves of the pair atomically. "No pair" is the logged-out state.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Returns the stored pair, if any.
	fn get(&self) -> StoreFuture<'_, Option<TokenPair>>;

	/// Persists or replaces the pair.
	fn set(&self, pair: TokenPair) -> StoreFuture<'_, ()>;

	/// Removes the pair, ending the session.
	fn clear(&self) -> StoreFuture<'_, ()>;

	/// Replaces the pair only if the stored refresh token still equals `expected_refresh`.
	///
	/// Refresh cycles use this so a rotation that lands after a logout or a fresh login never
	/// overwrites the newer state.
	fn compare_and_swap<'a>(
		&'a self,
		expected_refresh: &'a str,
		replacement: TokenPair,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;
}

/// Result of a refresh-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The refresh secret matched the expected value and the pair was replaced.
	Updated,
	/// A pair exists but carries a different refresh secret.
	RefreshMismatch,
	/// No pair is stored.
	Missing,
}
impl CompareAndSwapOutcome {
	pub(crate) fn evaluate(current: Option<&TokenPair>, expected_refresh: &str) -> Self {
		match current {
			Some(pair) if pair.refresh.expose() == expected_refresh => Self::Updated,
			Some(_) => Self::RefreshMismatch,
			None => Self::Missing,
		}
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

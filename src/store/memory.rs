//! Thread-safe in-memory [`TokenStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	store::{CompareAndSwapOutcome, StoreError, StoreFuture, TokenStore},
};

type Slot = Arc<RwLock<Option<TokenPair>>>;

/// Process-lifetime storage backend; the pair is lost when the process exits.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Creates a store already holding `pair`, as if a login had just completed.
	pub fn with_pair(pair: TokenPair) -> Self {
		Self(Arc::new(RwLock::new(Some(pair))))
	}

	/// Returns the stored pair without going through the async contract.
	pub fn snapshot(&self) -> Option<TokenPair> {
		self.0.read().clone()
	}

	fn set_now(slot: Slot, pair: TokenPair) -> Result<(), StoreError> {
		*slot.write() = Some(pair);

		Ok(())
	}

	fn cas_now(slot: Slot, expected_refresh: &str, replacement: TokenPair) -> CompareAndSwapOutcome {
		let mut guard = slot.write();
		let outcome = CompareAndSwapOutcome::evaluate(guard.as_ref(), expected_refresh);

		if matches!(outcome, CompareAndSwapOutcome::Updated) {
			*guard = Some(replacement);
		}

		outcome
	}
}
impl TokenStore for MemoryStore {
	fn get(&self) -> StoreFuture<'_, Option<TokenPair>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn set(&self, pair: TokenPair) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move { Self::set_now(slot, pair) })
	}

	fn clear(&self) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			slot.write().take();

			Ok(())
		})
	}

	fn compare_and_swap<'a>(
		&'a self,
		expected_refresh: &'a str,
		replacement: TokenPair,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(Self::cas_now(slot, expected_refresh, replacement)) })
	}
}

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use http::StatusCode;
use tokio::{sync::Semaphore, time};
// self
use storefront_auth::{
	auth::{TokenPair, TokenSecret},
	refresh::{RefreshCoordinator, RefreshError, RefreshState},
	store::{MemoryStore, TokenStore},
	transport::{HttpTransport, Request, Response, TransportFuture},
	url::Url,
};

/// Refresh endpoint that parks every call until the test hands out a permit.
struct GatedRefresh {
	gate: Semaphore,
	calls: AtomicUsize,
	status: StatusCode,
}
impl GatedRefresh {
	fn new(status: StatusCode) -> Arc<Self> {
		Arc::new(Self { gate: Semaphore::new(0), calls: AtomicUsize::new(0), status })
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl HttpTransport for GatedRefresh {
	fn send(&self, request: Request) -> TransportFuture<'_> {
		Box::pin(async move {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			let permit = self.gate.acquire().await.expect("Refresh gate should stay open.");

			permit.forget();

			let body = serde_json::json!({ "access": format!("A{}", call + 1) }).to_string();

			Ok(Response::new(request.url, self.status, body.into_bytes()))
		})
	}
}

type Coordinator = RefreshCoordinator<GatedRefresh>;

fn coordinator(transport: &Arc<GatedRefresh>) -> (Arc<Coordinator>, Arc<MemoryStore>) {
	let backend = Arc::new(MemoryStore::with_pair(TokenPair::new("A1", "R1")));
	let store: Arc<dyn TokenStore> = backend.clone();
	let endpoint = Url::parse("https://shop.example.com/api/token/refresh/")
		.expect("Refresh endpoint fixture should parse.");

	(Arc::new(RefreshCoordinator::new(store, Arc::clone(transport), endpoint)), backend)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
	time::timeout(time::Duration::from_secs(5), async {
		while !condition() {
			time::sleep(time::Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("Condition should hold within five seconds.");
}

fn spawn_refresh(
	coordinator: &Arc<Coordinator>,
) -> tokio::task::JoinHandle<Result<TokenSecret, RefreshError>> {
	let coordinator = Arc::clone(coordinator);

	tokio::spawn(async move { coordinator.refresh().await })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiters_share_the_single_remote_call() {
	let transport = GatedRefresh::new(StatusCode::OK);
	let (coordinator, store) = coordinator(&transport);
	let tasks = (0..8).map(|_| spawn_refresh(&coordinator)).collect::<Vec<_>>();

	wait_until(|| coordinator.metrics().joins() == 7 && transport.calls() == 1).await;

	assert_eq!(coordinator.state(), RefreshState::Refreshing);
	assert_eq!(transport.calls(), 1);

	transport.gate.add_permits(1);

	for task in tasks {
		let token = task
			.await
			.expect("Refresh task should not panic.")
			.expect("Refresh should succeed.");

		assert_eq!(token.expose(), "A2");
	}

	assert_eq!(transport.calls(), 1);
	assert_eq!(coordinator.state(), RefreshState::Idle);
	assert_eq!(store.snapshot(), Some(TokenPair::new("A2", "R1")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_caller_after_settlement_starts_a_new_cycle() {
	let transport = GatedRefresh::new(StatusCode::OK);
	let (coordinator, _) = coordinator(&transport);

	transport.gate.add_permits(2);

	let first = coordinator.refresh().await.expect("First cycle should succeed.");
	let second = coordinator.refresh().await.expect("Second cycle should succeed.");

	assert_eq!(first.expose(), "A2");
	assert_eq!(second.expose(), "A3");
	assert_eq!(transport.calls(), 2);
	assert_eq!(coordinator.metrics().attempts(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_waiter_receives_the_failure() {
	let transport = GatedRefresh::new(StatusCode::UNAUTHORIZED);
	let (coordinator, store) = coordinator(&transport);
	let tasks = (0..4).map(|_| spawn_refresh(&coordinator)).collect::<Vec<_>>();

	wait_until(|| coordinator.metrics().joins() == 3).await;
	transport.gate.add_permits(1);

	for task in tasks {
		let err = task
			.await
			.expect("Refresh task should not panic.")
			.expect_err("Rejected refresh should fail every waiter.");

		assert!(matches!(err, RefreshError::Rejected { status: 401 }));
	}

	assert_eq!(transport.calls(), 1);
	assert_eq!(store.snapshot(), None);
	assert_eq!(coordinator.metrics().failures(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_waiter_takes_over_when_the_leader_is_cancelled() {
	let transport = GatedRefresh::new(StatusCode::OK);
	let (coordinator, store) = coordinator(&transport);
	let leader = spawn_refresh(&coordinator);

	wait_until(|| transport.calls() == 1).await;

	let waiter = spawn_refresh(&coordinator);

	wait_until(|| coordinator.metrics().joins() == 1).await;
	leader.abort();
	wait_until(|| transport.calls() == 2).await;
	transport.gate.add_permits(1);

	let token = waiter
		.await
		.expect("Waiter task should not panic.")
		.expect("Waiter should complete the cycle itself.");

	assert_eq!(token.expose(), "A3");
	assert_eq!(coordinator.state(), RefreshState::Idle);
	assert_eq!(store.snapshot(), Some(TokenPair::new("A3", "R1")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn an_abandoned_cycle_is_taken_over_as_an_attempt() {
	let transport = GatedRefresh::new(StatusCode::OK);
	let (coordinator, store) = coordinator(&transport);
	let leader = spawn_refresh(&coordinator);

	wait_until(|| transport.calls() == 1).await;
	leader.abort();

	assert!(leader.await.expect_err("Aborted leader should not finish.").is_cancelled());

	let successor = spawn_refresh(&coordinator);

	wait_until(|| transport.calls() == 2).await;
	transport.gate.add_permits(1);

	let token = successor
		.await
		.expect("Successor task should not panic.")
		.expect("Successor should complete the cycle itself.");

	assert_eq!(token.expose(), "A3");
	assert_eq!(coordinator.metrics().attempts(), 2);
	assert_eq!(coordinator.metrics().joins(), 0);
	assert_eq!(coordinator.state(), RefreshState::Idle);
	assert_eq!(store.snapshot(), Some(TokenPair::new("A3", "R1")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn logout_during_refresh_ends_the_session() {
	let transport = GatedRefresh::new(StatusCode::OK);
	let (coordinator, store) = coordinator(&transport);
	let task = spawn_refresh(&coordinator);

	wait_until(|| transport.calls() == 1).await;
	store.clear().await.expect("Logout should clear the store.");
	transport.gate.add_permits(1);

	let err = task
		.await
		.expect("Refresh task should not panic.")
		.expect_err("Refresh completing after logout should fail.");

	assert!(matches!(err, RefreshError::SessionEnded));
	assert_eq!(store.snapshot(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn login_during_refresh_wins() {
	let transport = GatedRefresh::new(StatusCode::OK);
	let (coordinator, store) = coordinator(&transport);
	let task = spawn_refresh(&coordinator);

	wait_until(|| transport.calls() == 1).await;
	store.set(TokenPair::new("B1", "S1")).await.expect("Login should store the new pair.");
	transport.gate.add_permits(1);

	let token = task
		.await
		.expect("Refresh task should not panic.")
		.expect("Refresh should defer to the newer session.");

	assert_eq!(token.expose(), "B1");
	assert_eq!(store.snapshot(), Some(TokenPair::new("B1", "S1")));
}

//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use time::{Duration, OffsetDateTime};
// self
use storefront_auth::{
	auth::TokenPair,
	client::AuthenticatedClient,
	config::ClientConfig,
	store::{MemoryStore, TokenStore},
	transport::ReqwestTransport,
	url::Url,
};

pub type TestClient = AuthenticatedClient<ReqwestTransport>;

/// Unsigned JWT carrying `exp`; `label` becomes the `jti` so tokens stay distinct.
pub fn jwt_with_exp(label: &str, exp: i64) -> String {
	let payload = serde_json::json!({ "exp": exp, "jti": label });

	format!(
		"{}.{}.{}",
		URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
		URL_SAFE_NO_PAD.encode(payload.to_string()),
		URL_SAFE_NO_PAD.encode(label),
	)
}

pub fn fresh_jwt(label: &str) -> String {
	jwt_with_exp(label, (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp())
}

pub fn expired_jwt(label: &str) -> String {
	jwt_with_exp(label, (OffsetDateTime::now_utc() - Duration::minutes(1)).unix_timestamp())
}

pub fn config_for(base_url: &str) -> ClientConfig {
	ClientConfig::builder(Url::parse(base_url).expect("Mock server base URL should parse."))
		.build()
		.expect("Default client configuration should validate.")
}

/// Reqwest-backed client with an in-memory store, pointed at a mock server.
pub fn build_client(config: ClientConfig) -> (TestClient, Arc<MemoryStore>) {
	let backend = Arc::new(MemoryStore::default());
	let store: Arc<dyn TokenStore> = backend.clone();
	let transport =
		ReqwestTransport::from_config(&config).expect("Failed to build reqwest transport for tests.");

	(AuthenticatedClient::with_transport(config, store, transport), backend)
}

pub async fn seed(store: &MemoryStore, access: &str, refresh: &str) {
	store.set(TokenPair::new(access, refresh)).await.expect("Seeding the token store should succeed.");
}

pub fn bearer(token: &str) -> String {
	format!("Bearer {token}")
}

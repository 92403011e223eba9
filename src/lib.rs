//! Authenticated storefront API client: bearer attachment, fail-closed expiry checks, and
//! single-flight token refresh with one-shot request replay.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod ext;
pub mod obs;
pub mod refresh;
pub mod session;
pub mod store;
pub mod transport;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and token fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

	/// Builds an unsigned JWT whose payload carries the provided `exp` claim.
	///
	/// The header and signature segments are placeholders; the client never verifies
	/// signatures, it only reads the expiry.
	pub fn jwt_with_exp(label: &str, exp: i64) -> String {
		let payload = serde_json::json!({ "exp": exp, "jti": label, "token_type": "access" });

		format!(
			"{}.{}.{}",
			URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
			URL_SAFE_NO_PAD.encode(payload.to_string()),
			URL_SAFE_NO_PAD.encode(label),
		)
	}

	/// Builds a JWT that stays valid for the next hour.
	pub fn fresh_jwt(label: &str) -> String {
		jwt_with_exp(label, (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp())
	}

	/// Builds a JWT that expired a minute ago.
	pub fn expired_jwt(label: &str) -> String {
		jwt_with_exp(label, (OffsetDateTime::now_utc() - Duration::minutes(1)).unix_timestamp())
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::OnceCell as AsyncOnceCell;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};

//! Fail-closed inspection of JWT expiry claims.
//!
//! The client never verifies signatures; it only needs to know whether an access token is
//! worth attaching. Anything that cannot be decoded is treated exactly like an expired token.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Decoded JWT payload fields the client cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
	/// Expiry instant in epoch seconds.
	pub exp: Option<i64>,
	/// Issued-at instant in epoch seconds.
	pub iat: Option<i64>,
	/// Token identifier.
	pub jti: Option<String>,
	/// Issuer-specific token type (for example `access`).
	pub token_type: Option<String>,
}
impl Claims {
	/// Decodes the payload segment of a compact JWT.
	///
	/// Returns `None` for anything malformed: wrong segment count, invalid base64, non-JSON or
	/// non-object payloads. Numeric claims given as floats are truncated toward negative
	/// infinity; claims of any other JSON type are ignored.
	pub fn decode(token: &str) -> Option<Self> {
		let mut segments = token.split('.');
		let (_header, payload) = (segments.next()?, segments.next()?);
		let bytes = decode_segment(payload)?;
		let object: Map<String, Value> = serde_json::from_slice(&bytes).ok()?;

		Some(Self {
			exp: object.get("exp").and_then(epoch_seconds),
			iat: object.get("iat").and_then(epoch_seconds),
			jti: object.get("jti").and_then(Value::as_str).map(str::to_owned),
			token_type: object.get("token_type").and_then(Value::as_str).map(str::to_owned),
		})
	}

	/// Returns the expiry as an instant, if present and representable.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		OffsetDateTime::from_unix_timestamp(self.exp?).ok()
	}
}

/// Answers "is this token usable right now" from its `exp` claim.
///
/// A token is expired when it cannot be decoded, carries no `exp`, or `exp <= now + leeway`.
/// Equality counts as expired. The leeway defaults to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClaimsInspector {
	leeway: Duration,
}
impl ClaimsInspector {
	/// Creates an inspector with zero leeway.
	pub const fn new() -> Self {
		Self { leeway: Duration::ZERO }
	}

	/// Treats tokens as expired this long before their `exp` instant. Negative values clamp to
	/// zero.
	pub fn with_leeway(mut self, leeway: Duration) -> Self {
		self.leeway = if leeway.is_negative() { Duration::ZERO } else { leeway };

		self
	}

	/// Configured leeway.
	pub fn leeway(&self) -> Duration {
		self.leeway
	}

	/// See [`Claims::decode`].
	pub fn decode(&self, token: &str) -> Option<Claims> {
		Claims::decode(token)
	}

	/// Returns `true` unless the token decodes to an `exp` strictly after `now + leeway`.
	pub fn is_expired(&self, token: &str, now: OffsetDateTime) -> bool {
		let Some(exp) = self.decode(token).and_then(|claims| claims.exp) else {
			return true;
		};

		exp <= (now + self.leeway).unix_timestamp()
	}

	/// Convenience inverse of [`ClaimsInspector::is_expired`].
	pub fn is_usable(&self, token: &str, now: OffsetDateTime) -> bool {
		!self.is_expired(token, now)
	}

	/// Returns the token's expiry instant, if it can be decoded.
	pub fn expires_at(&self, token: &str) -> Option<OffsetDateTime> {
		self.decode(token)?.expires_at()
	}
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
	let normalized: String = segment
		.trim_end_matches('=')
		.chars()
		.map(|c| match c {
			'+' => '-',
			'/' => '_',
			other => other,
		})
		.collect();

	if normalized.is_empty() {
		return None;
	}

	URL_SAFE_NO_PAD.decode(normalized).ok()
}

fn epoch_seconds(value: &Value) -> Option<i64> {
	match value {
		Value::Number(number) => number.as_i64().or_else(|| {
			number.as_f64().filter(|f| f.is_finite()).map(|f| f.floor()).and_then(|f| {
				(f >= i64::MIN as f64 && f <= i64::MAX as f64).then_some(f as i64)
			})
		}),
		_ => None,
	}
}

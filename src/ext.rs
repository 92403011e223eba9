//! Public extension contracts.
//!
//! [`RequestSignerExt`] decides how an access token is attached to an outbound request. The
//! default [`BearerSigner`] writes `Authorization: Bearer <token>`; APIs that expect another
//! scheme or header can plug in their own signer via
//! [`AuthenticatedClient::with_signer`](crate::client::AuthenticatedClient::with_signer).

pub mod request_signer;

pub use request_signer::*;

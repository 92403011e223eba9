//! Auth-domain token models and the expiry-claim inspector.

pub mod claims;
pub mod token;

pub use claims::*;
pub use token::{pair::*, secret::*};

//! Token secrets and the persisted access/refresh pair.

pub mod pair;
pub mod secret;

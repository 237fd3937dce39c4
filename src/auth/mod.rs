//! Bearer token authentication for connection upgrades.

mod claims;
mod jwt;

pub use claims::Claims;
pub use jwt::{AuthenticatedUser, JwtValidator};

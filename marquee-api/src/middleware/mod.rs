pub mod auth;

pub use auth::{holder_auth_middleware, HolderClaims};

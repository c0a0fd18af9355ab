//! Password authentication for trailsync.
//!
//! This crate provides:
//! - Username/password login with bcrypt, lockout and rate limiting
//! - Session storage (in-memory, or Postgres via the `postgres` feature)
//! - Axum extractors for authenticated and admin users

mod bootstrap;
mod config;
mod error;
mod extractors;
mod handlers;
mod password;
mod rate_limit;
mod sessions;
mod state;
#[cfg(test)]
mod test_support;

pub use bootstrap::{create_account, ensure_admin_user};
pub use config::AuthConfig;
pub use error::AuthError;
pub use extractors::{authenticate, session_id_from_headers, AdminUser, CurrentUser, OptionalUser};
pub use handlers::{auth_routes, LoginRequest, LoginResponse};
pub use password::{hash_password, verify_password};
pub use rate_limit::RateLimiter;
#[cfg(feature = "postgres")]
pub use sessions::PgSessionStore;
pub use sessions::InMemorySessionStore;
pub use state::AuthState;

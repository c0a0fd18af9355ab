//! Session storage implementations.
//!
//! Provides `SessionRepository` implementations for:
//! - In-memory (always available; tests and demo mode)
//! - Postgres (with `postgres` feature)

mod inmemory;
#[cfg(feature = "postgres")]
mod postgres;

pub use inmemory::InMemorySessionStore;
#[cfg(feature = "postgres")]
pub use postgres::PgSessionStore;

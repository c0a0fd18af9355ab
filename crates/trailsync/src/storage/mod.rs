//! Storage backend implementations.
//!
//! Concrete implementations of the repository traits defined in
//! `trailsync_core::storage`, plus the retry wrapper applied to database
//! calls.
//!
//! # Feature Flags
//!
//! - default: in-memory storage only
//! - `postgres`: Postgres storage backend using `sqlx`, selected at runtime
//!   when `DATABASE_URL` is set
//!
//! # Examples
//!
//! Build with Postgres support:
//! ```bash
//! cargo build -p trailsync --features postgres
//! ```

pub mod inmemory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod retry;
mod retrying;

pub use inmemory::InMemoryRepository;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRepository;
pub use retry::{with_retry, RetryPolicy};
pub use retrying::RetryingActivityRepository;

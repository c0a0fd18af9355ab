//! Postgres storage backend.
//!
//! Implements every repository trait over a `sqlx::PgPool`. The schema is
//! created on startup with `CREATE TABLE IF NOT EXISTS`.

mod conversions;
mod error;
mod repository;
mod schema;

pub use repository::PostgresRepository;

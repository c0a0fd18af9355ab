//! In-memory storage backend.
//!
//! Every repository trait over HashMaps wrapped in `Arc<RwLock<_>>`. Used by
//! tests and demo mode; nothing is persisted.

mod repository;

pub use repository::InMemoryRepository;

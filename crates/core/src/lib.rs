//! Functional core for trailsync.
//!
//! Pure types, validation and calculations shared by the auth crate and the
//! server. Nothing in here performs I/O; repository traits describe the
//! storage seams that the server implements.

pub mod activity;
pub mod auth;
pub mod chat;
pub mod connection;
pub mod mock_data;
pub mod polyline;
pub mod serde;
pub mod settings;
pub mod storage;

pub mod activities;
pub mod admin;
mod authz;
pub mod chat;
pub mod connections;
pub mod debug;
pub mod error;
pub mod health;
pub mod import;
pub mod map;
pub mod pages;

pub use error::{ApiError, AppError};

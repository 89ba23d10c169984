//! # gallery-store
//!
//! SQLite storage for the couples gallery: uploaded images and the comment
//! threads attached to them.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed create/read helpers for both
//! domain models. Rows are never updated or deleted by the helpers; the only
//! destructive operation is [`Database::reset_schema`].

pub mod database;
pub mod images;
pub mod messages;
pub mod migrations;
pub mod models;

mod columns;
mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;

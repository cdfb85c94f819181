//! Core data models for the gateway.
//!
//! Storage keys and collection paths carry the path-safety invariants;
//! objects map to SQLite rows via `sqlx::FromRow`; multipart types describe
//! bulk uploads and serialize as JSON via `serde`.

pub mod key;
pub mod multipart;
pub mod object;

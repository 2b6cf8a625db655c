//! Pure domain layer for Focal: shared types, the error taxonomy, and slug
//! normalization. No I/O -- everything here is usable from both the server
//! and the client crates.

pub mod error;
pub mod slug;
pub mod types;

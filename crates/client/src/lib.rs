//! Client-side optimistic mutation layer for the Focal API.
//!
//! Owns a keyed cache of query results (project list pages and project
//! details) and applies create/update/delete mutations to that cache
//! *before* the server confirms them, rolling back deterministically on
//! failure. See [`engine::MutationEngine`] for the four-phase protocol.

pub mod cache;
pub mod engine;
pub mod http;
pub mod keys;
pub mod transport;
pub mod types;

pub use engine::{EngineError, MutationEngine};
pub use keys::{ListFilter, QueryKey};
pub use transport::{ProjectTransport, TransportError};

//! Entity models: database rows plus request/response DTOs.

pub mod project;
pub mod user;

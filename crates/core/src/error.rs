use crate::types::DbId;

/// Domain-level error taxonomy.
///
/// Every failure a handler can surface maps onto one of these variants; the
/// api crate translates them into HTTP status codes and JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The entity does not exist, or is not owned by the caller. The two
    /// cases are deliberately indistinguishable so ownership checks never
    /// leak existence.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Suffix search space exhausted while resolving a unique slug.
    /// Only reachable when an owner holds thousands of same-named projects.
    #[error("Could not find a free slug for '{base}'")]
    SlugExhausted { base: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

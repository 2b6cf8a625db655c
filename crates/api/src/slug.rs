//! Server-side slug uniqueness resolver.
//!
//! Given a desired display name and an owner, derives a URL-safe slug that
//! no other project of that owner uses, appending `-1`, `-2`, ... on
//! collision. The resolver is best-effort: two concurrent requests can both
//! see a slug as free, so the `uq_projects_owner_slug` unique constraint is
//! the authority, and the write path retries resolution once when it loses
//! that race.

use sqlx::PgPool;

use focal_core::error::CoreError;
use focal_core::slug::{slugify, suffixed};
use focal_core::types::DbId;
use focal_db::repositories::ProjectRepo;

use crate::error::AppResult;

/// Upper bound on suffix probes. An owner would need this many same-named
/// projects before resolution gives up with [`CoreError::SlugExhausted`].
const MAX_SLUG_ATTEMPTS: u32 = 10_000;

/// Resolve a unique slug for `desired_name` within `owner_id`'s project set.
///
/// `exclude_id` excludes one project from the collision check so renaming a
/// project back to its own current name keeps its slug instead of gaining a
/// spurious suffix.
pub async fn resolve_slug(
    pool: &PgPool,
    desired_name: &str,
    owner_id: DbId,
    exclude_id: Option<DbId>,
) -> AppResult<String> {
    let base = slugify(desired_name);

    if !ProjectRepo::slug_exists(pool, owner_id, &base, exclude_id).await? {
        return Ok(base);
    }

    for n in 1..=MAX_SLUG_ATTEMPTS {
        let candidate = suffixed(&base, n);
        if !ProjectRepo::slug_exists(pool, owner_id, &candidate, exclude_id).await? {
            tracing::debug!(owner_id, %base, %candidate, "slug collision resolved with suffix");
            return Ok(candidate);
        }
    }

    Err(CoreError::SlugExhausted { base }.into())
}

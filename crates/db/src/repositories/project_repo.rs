//! Repository for the `projects` table.
//!
//! Every query is scoped to an owner id; a project that exists but belongs
//! to someone else is indistinguishable from one that does not exist.

use sqlx::PgPool;

use focal_core::types::DbId;

use crate::models::project::{CreateProject, Project, ProjectFilter, ProjectStatus, UpdateProject};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, owner_id, name, description, slug, status, created_at, updated_at";

/// Escape LIKE/ILIKE metacharacters so search input matches literally
/// (a query for `100%` should not match everything).
fn escape_like(q: &str) -> String {
    q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Provides CRUD operations for projects.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new project with an already-resolved slug, returning the row.
    ///
    /// May fail with a unique violation on `uq_projects_owner_slug` if a
    /// concurrent create won the same slug; the caller re-resolves and
    /// retries once.
    pub async fn create(
        pool: &PgPool,
        owner_id: DbId,
        input: &CreateProject,
        slug: &str,
    ) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (owner_id, name, description, slug)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(owner_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(slug)
            .fetch_one(pool)
            .await
    }

    /// Find a project by id, scoped to its owner.
    pub async fn find_by_id(
        pool: &PgPool,
        owner_id: DbId,
        id: DbId,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// List one page of an owner's projects, newest first, with the total
    /// row count for the same filter.
    pub async fn list_page(
        pool: &PgPool,
        owner_id: DbId,
        filter: &ProjectFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Project>, i64), sqlx::Error> {
        let status = filter.status.unwrap_or(ProjectStatus::Active);
        // Empty search string matches everything, same as no search.
        let pattern = filter
            .q
            .as_deref()
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", escape_like(q)));

        let query = format!(
            "SELECT {COLUMNS} FROM projects
             WHERE owner_id = $1 AND status = $2
               AND ($3::text IS NULL OR name ILIKE $3 OR description ILIKE $3)
             ORDER BY created_at DESC
             LIMIT $4 OFFSET $5"
        );
        let projects = sqlx::query_as::<_, Project>(&query)
            .bind(owner_id)
            .bind(status)
            .bind(&pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM projects
             WHERE owner_id = $1 AND status = $2
               AND ($3::text IS NULL OR name ILIKE $3 OR description ILIKE $3)",
        )
        .bind(owner_id)
        .bind(status)
        .bind(&pattern)
        .fetch_one(pool)
        .await?;

        Ok((projects, total))
    }

    /// Check whether an owner already uses `slug`, optionally excluding one
    /// project id (so a rename back to the current name does not collide
    /// with itself).
    pub async fn slug_exists(
        pool: &PgPool,
        owner_id: DbId,
        slug: &str,
        exclude_id: Option<DbId>,
    ) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM projects
                 WHERE owner_id = $1 AND slug = $2 AND ($3::bigint IS NULL OR id <> $3)
             )",
        )
        .bind(owner_id)
        .bind(slug)
        .bind(exclude_id)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// Update a project, scoped to its owner. Only non-`None` fields in
    /// `input` are applied; `slug` is rewritten only when a new one was
    /// resolved (i.e. when the name changed). `updated_at` is always
    /// refreshed.
    ///
    /// Returns `None` if no owned row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        owner_id: DbId,
        id: DbId,
        input: &UpdateProject,
        slug: Option<&str>,
    ) -> Result<Option<Project>, sqlx::Error> {
        let query = format!(
            "UPDATE projects SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                status = COALESCE($5, status),
                slug = COALESCE($6, slug),
                updated_at = NOW()
             WHERE id = $1 AND owner_id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(owner_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.status)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    /// Delete a project, scoped to its owner. Returns `true` if a row was
    /// removed.
    pub async fn delete(pool: &PgPool, owner_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }
}

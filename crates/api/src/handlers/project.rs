//! Handlers for the `/projects` resource.
//!
//! Every operation is scoped to the authenticated owner. Ownership failures
//! surface as plain not-found so a caller cannot probe for other users'
//! project ids.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use validator::Validate;

use focal_core::error::CoreError;
use focal_core::types::DbId;
use focal_db::models::project::{CreateProject, Project, ProjectFilter, UpdateProject};
use focal_db::repositories::ProjectRepo;

use crate::error::{is_unique_violation, AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::{Pagination, ProjectListParams, ProjectPage, MAX_PAGE, PAGE_LIMIT};
use crate::slug::resolve_slug;
use crate::state::AppState;

/// Name of the unique constraint backing per-owner slug uniqueness.
const SLUG_CONSTRAINT: &str = "uq_projects_owner_slug";

/// POST /api/v1/projects
///
/// Resolves a collision-free slug for the new project, then inserts. If a
/// concurrent create wins the same slug between resolution and insert, the
/// unique constraint fires and the slug is re-resolved once against the
/// now-current set before retrying the insert.
pub async fn create(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateProject>,
) -> AppResult<(StatusCode, Json<Project>)> {
    input.validate().map_err(AppError::from_validation)?;

    let slug = resolve_slug(&state.pool, &input.name, user.user_id, None).await?;

    let project = match ProjectRepo::create(&state.pool, user.user_id, &input, &slug).await {
        Ok(project) => project,
        Err(err) if is_unique_violation(&err, SLUG_CONSTRAINT) => {
            tracing::warn!(owner_id = user.user_id, %slug, "lost slug race, re-resolving");
            let slug = resolve_slug(&state.pool, &input.name, user.user_id, None).await?;
            ProjectRepo::create(&state.pool, user.user_id, &input, &slug).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(owner_id = user.user_id, project_id = project.id, slug = %project.slug, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/v1/projects
///
/// Paged listing with optional substring search and status filter. An empty
/// page is a valid result.
pub async fn list(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<ProjectListParams>,
) -> AppResult<Json<ProjectPage>> {
    let page = params.page.unwrap_or(1).clamp(1, MAX_PAGE);
    let offset = (page - 1) * PAGE_LIMIT;

    let filter = ProjectFilter {
        q: params.q,
        status: params.status,
    };

    let (projects, total) =
        ProjectRepo::list_page(&state.pool, user.user_id, &filter, PAGE_LIMIT, offset).await?;

    Ok(Json(ProjectPage {
        projects,
        pagination: Pagination::new(page, PAGE_LIMIT, total),
    }))
}

/// GET /api/v1/projects/{id}
pub async fn get_by_id(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<Project>> {
    let project = ProjectRepo::find_by_id(&state.pool, user.user_id, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Project",
            id,
        }))?;
    Ok(Json(project))
}

/// PATCH /api/v1/projects/{id}
///
/// Partial update. The slug is recomputed iff `name` is present; renaming a
/// project to its current name keeps its slug (the project's own id is
/// excluded from the collision check).
pub async fn update(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateProject>,
) -> AppResult<Json<Project>> {
    input.validate().map_err(AppError::from_validation)?;

    // Ownership check up front so a foreign id 404s before any slug work.
    ProjectRepo::find_by_id(&state.pool, user.user_id, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Project",
            id,
        }))?;

    let slug = match &input.name {
        Some(name) => Some(resolve_slug(&state.pool, name, user.user_id, Some(id)).await?),
        None => None,
    };

    let updated =
        match ProjectRepo::update(&state.pool, user.user_id, id, &input, slug.as_deref()).await {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err, SLUG_CONSTRAINT) => {
                let name = input.name.as_deref().unwrap_or_default();
                tracing::warn!(owner_id = user.user_id, project_id = id, "lost slug race, re-resolving");
                let slug = resolve_slug(&state.pool, name, user.user_id, Some(id)).await?;
                ProjectRepo::update(&state.pool, user.user_id, id, &input, Some(&slug)).await?
            }
            Err(err) => return Err(err.into()),
        };

    let project = updated.ok_or(AppError::Core(CoreError::NotFound {
        entity: "Project",
        id,
    }))?;

    Ok(Json(project))
}

/// DELETE /api/v1/projects/{id}
pub async fn delete(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let deleted = ProjectRepo::delete(&state.pool, user.user_id, id).await?;
    if deleted {
        tracing::info!(owner_id = user.user_id, project_id = id, "project deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "Project",
            id,
        }))
    }
}

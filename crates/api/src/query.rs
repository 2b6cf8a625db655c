//! Shared query parameter and response envelope types for API handlers.

use serde::{Deserialize, Serialize};

use focal_db::models::project::{Project, ProjectStatus};

/// Page size for project listings.
pub const PAGE_LIMIT: i64 = 12;

/// Ceiling for the `page` parameter. Keeps the OFFSET arithmetic well away
/// from i64 overflow on hostile input; any page past real data is an empty
/// (valid) result anyway.
pub const MAX_PAGE: i64 = 100_000;

/// Query parameters for `GET /projects` (`?page=&q=&status=`).
#[derive(Debug, Deserialize)]
pub struct ProjectListParams {
    /// 1-based page number, clamped to `1..=MAX_PAGE`.
    pub page: Option<i64>,
    /// Case-insensitive substring match on name or description.
    pub q: Option<String>,
    /// Defaults to `ACTIVE` when omitted.
    pub status: Option<ProjectStatus>,
}

/// Pagination metadata returned with every list page.
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Pagination {
            page,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

/// Response envelope for `GET /projects`.
#[derive(Debug, Serialize)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    pub pagination: Pagination,
}

//! The request/response boundary between the mutation engine and the server.
//!
//! The engine talks to this trait, never to reqwest directly, so tests can
//! substitute an in-process transport with scripted outcomes and timing.

use async_trait::async_trait;

use focal_core::types::DbId;

use crate::keys::ListFilter;
use crate::types::{CreateProjectInput, Project, ProjectPage, UpdateProjectInput};

/// Failure of a single request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The server rejected the request (4xx/5xx) with a message.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The request never produced a server response.
    #[error("Network error: {0}")]
    Network(String),
}

/// Async boundary the engine issues all requests through.
#[async_trait]
pub trait ProjectTransport: Send + Sync {
    async fn create_project(&self, input: &CreateProjectInput) -> Result<Project, TransportError>;

    async fn update_project(
        &self,
        id: DbId,
        patch: &UpdateProjectInput,
    ) -> Result<Project, TransportError>;

    async fn delete_project(&self, id: DbId) -> Result<(), TransportError>;

    async fn list_projects(&self, filter: &ListFilter) -> Result<ProjectPage, TransportError>;

    async fn get_project(&self, id: DbId) -> Result<Project, TransportError>;
}

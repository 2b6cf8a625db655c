//! reqwest-backed [`ProjectTransport`] talking to the Focal API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use focal_core::types::DbId;

use crate::keys::ListFilter;
use crate::transport::{ProjectTransport, TransportError};
use crate::types::{CreateProjectInput, Project, ProjectPage, UpdateProjectInput};

/// HTTP transport bound to one API base URL and one bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpTransport {
    /// `base_url` is the server root, e.g. `http://localhost:3000`; the
    /// `/api/v1` prefix is added here.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        HttpTransport {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }

    /// Decode a successful body, or map an error response to
    /// [`TransportError::Rejected`] using the server's `error` field.
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| TransportError::Network(format!("Invalid response body: {e}")))
        } else {
            Err(Self::rejection(status, response).await)
        }
    }

    async fn rejection(status: StatusCode, response: Response) -> TransportError {
        let message = match response.json::<serde_json::Value>().await {
            Ok(body) => body["error"]
                .as_str()
                .unwrap_or("Request failed")
                .to_string(),
            Err(_) => "Request failed".to_string(),
        };
        TransportError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl ProjectTransport for HttpTransport {
    async fn create_project(&self, input: &CreateProjectInput) -> Result<Project, TransportError> {
        let response = self
            .authed(self.client.post(self.url("/projects")))
            .json(input)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn update_project(
        &self,
        id: DbId,
        patch: &UpdateProjectInput,
    ) -> Result<Project, TransportError> {
        let response = self
            .authed(self.client.patch(self.url(&format!("/projects/{id}"))))
            .json(patch)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn delete_project(&self, id: DbId) -> Result<(), TransportError> {
        let response = self
            .authed(self.client.delete(self.url(&format!("/projects/{id}"))))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::rejection(status, response).await)
        }
    }

    async fn list_projects(&self, filter: &ListFilter) -> Result<ProjectPage, TransportError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if filter.page > 0 {
            query.push(("page", filter.page.to_string()));
        }
        if let Some(q) = &filter.q {
            query.push(("q", q.clone()));
        }
        if let Some(status) = filter.status {
            let label = match status {
                crate::types::ProjectStatus::Active => "ACTIVE",
                crate::types::ProjectStatus::Archived => "ARCHIVED",
            };
            query.push(("status", label.to_string()));
        }

        let response = self
            .authed(self.client.get(self.url("/projects")))
            .query(&query)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get_project(&self, id: DbId) -> Result<Project, TransportError> {
        let response = self
            .authed(self.client.get(self.url(&format!("/projects/{id}"))))
            .send()
            .await?;
        Self::decode(response).await
    }
}

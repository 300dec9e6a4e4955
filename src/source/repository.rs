//! Reference `RepositorySource`: an HTTP-backed catalog, following the same
//! base-url-plus-sub-path layering this codebase's template storage module
//! uses for its builtin/user/project directories, adapted to a single remote
//! root.

use async_trait::async_trait;
use reqwest::Client;

use super::{RepositoryItem, RepositorySource};
use crate::error::{Result, WorkflowError};
use crate::model::Workflow;

pub struct HttpRepositorySource {
    base_url: String,
    client: Client,
}

impl HttpRepositorySource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    fn join(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RepositorySource for HttpRepositorySource {
    async fn list(&self, path: Option<&str>) -> Result<Vec<RepositoryItem>> {
        let url = self.join(&format!("{}?list=1", path.unwrap_or("")));
        let response = self.client.get(&url).send().await.map_err(WorkflowError::RepositoryNetworkError)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(WorkflowError::RepositoryPathNotFound(path.unwrap_or("").to_string()));
        }
        if !response.status().is_success() {
            return Err(WorkflowError::RepositoryHttpError(response.status().as_u16()));
        }
        response
            .json::<Vec<RepositoryItem>>()
            .await
            .map_err(|_| WorkflowError::RepositoryParseError)
    }

    async fn get(&self, path: &str) -> Result<Workflow> {
        let url = self.join(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(WorkflowError::RepositoryNetworkError)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(WorkflowError::RepositoryPathNotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(WorkflowError::RepositoryHttpError(response.status().as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(WorkflowError::RepositoryNetworkError)?;
        super::decode_workflow(&body)
    }

    async fn resolve(&self, path: &str, file: &str) -> Result<String> {
        if file.contains("..") {
            return Err(WorkflowError::TemplateInvalidUrl(file.to_string()));
        }
        Ok(self.join(&format!("{}/{}", path.trim_end_matches('/'), file)))
    }
}

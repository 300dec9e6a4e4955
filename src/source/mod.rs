//! External collaborators the core consumes through stable interfaces:
//! decoding the declarative document (`decode_workflow`) and the repository
//! source contract (`RepositorySource`) the template executor resolves and
//! fetches files through.

pub mod repository;

use async_trait::async_trait;

use crate::error::{Result, WorkflowError};
use crate::model::Workflow;

/// Decode a declarative workflow document. The reference implementation is
/// YAML; an embedder may swap in their own decoder entirely, which is why
/// this lives behind a free function rather than being baked into `Engine`.
pub fn decode_workflow(document: &str) -> Result<Workflow> {
    serde_yaml::from_str(document).map_err(WorkflowError::ParsingFailed)
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum RepositoryItemType {
    File,
    Folder,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RepositoryItem {
    pub name: String,
    pub description: Option<String>,
    pub path: String,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub item_type: RepositoryItemType,
}

/// The repository-source contract a template executor resolves and fetches
/// files through. `list`/`get` surface a remote catalog of workflows and
/// templates; `resolve` turns a `(repository path, file reference)` pair
/// into a URL or local path the template executor can fetch bytes from.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    async fn list(&self, path: Option<&str>) -> Result<Vec<RepositoryItem>>;
    async fn get(&self, path: &str) -> Result<Workflow>;
    async fn resolve(&self, path: &str, file: &str) -> Result<String>;
}

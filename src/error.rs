//! Central error type for the workflow engine.
//!
//! Every fallible operation the engine exposes across the `execute()` event
//! boundary returns [`WorkflowError`], never a bare string or a panic.

use std::path::PathBuf;

use crate::model::{JobId, ScriptKind};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("duplicate job id: {0}")]
    DuplicateNode(JobId),

    #[error("job '{job_id}' depends on unknown job '{dep_id}'")]
    MissingDependency { job_id: JobId, dep_id: JobId },

    #[error("cyclic dependency: {}", format_cycle(.0))]
    CyclicDependency(Vec<JobId>),

    #[error("failed to parse workflow document")]
    ParsingFailed(#[source] serde_yaml::Error),

    #[error("unsupported script type: {0:?}")]
    UnsupportedScriptType(ScriptKind),

    #[error("operation only valid on the root node")]
    NotRootNode,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("command exited with status {exit_code}: {tail}")]
    CommandFailed { exit_code: i32, tail: String },

    #[error("process failed: {0}")]
    ProcessFailed(String),

    #[error("template file not found: {0}")]
    TemplateFileNotFound(PathBuf),

    #[error("invalid template url: {0}")]
    TemplateInvalidUrl(String),

    #[error("invalid template: {0}")]
    TemplateInvalid(String),

    #[error("repository path not found: {0}")]
    RepositoryPathNotFound(String),

    #[error("repository http error: {0}")]
    RepositoryHttpError(u16),

    #[error("repository network error")]
    RepositoryNetworkError(#[source] reqwest::Error),

    #[error("repository parse error")]
    RepositoryParseError,

    #[error("io error")]
    Io(#[from] std::io::Error),
}

fn format_cycle(path: &[JobId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

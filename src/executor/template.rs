//! Reference template executor: resolves each `(file, output)` pair through
//! the repository source, fetches and renders it, and writes the result.
//!
//! Rendering follows this codebase's template module's `{variable}`
//! placeholder substitution.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{EventStream, ExecutionContext, ScriptExecutor, EVENT_BUFFER};
use crate::error::{Result as EngineResult, WorkflowError};
use crate::model::{FormData, ResultEvent, Script, TemplateFile};

pub struct TemplateExecutor {
    http: reqwest::Client,
}

impl Default for TemplateExecutor {
    fn default() -> Self {
        Self { http: reqwest::Client::new() }
    }
}

#[async_trait]
impl ScriptExecutor for TemplateExecutor {
    async fn execute(&self, script: Script, ctx: ExecutionContext) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let Script::Template { id: script_id, files } = script else {
            let kind = script.kind();
            let _ = tx.try_send(Err(WorkflowError::UnsupportedScriptType(kind)));
            return rx;
        };

        let http = self.http.clone();
        tokio::spawn(async move {
            run(http, script_id, files, ctx, tx).await;
        });

        rx
    }
}

async fn run(
    http: reqwest::Client,
    script_id: crate::model::ScriptId,
    files: Vec<TemplateFile>,
    ctx: ExecutionContext,
    tx: mpsc::Sender<EngineResult<ResultEvent>>,
) {
    let total = files.len();
    for (completed, file) in files.into_iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            return;
        }

        let result = render_one(&http, &ctx, &file).await;
        match result {
            Ok(()) => {
                let event = ResultEvent::TemplateProgress {
                    script_id: script_id.clone(),
                    output_path: file.output.clone(),
                    completed: completed + 1,
                    total,
                };
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
}

async fn render_one(
    http: &reqwest::Client,
    ctx: &ExecutionContext,
    file: &TemplateFile,
) -> EngineResult<()> {
    let resolved = if let Some(source) = &ctx.repository_source {
        let repo_path = ctx.repository_path.as_deref().unwrap_or("");
        source.resolve(repo_path, &file.file).await?
    } else {
        file.file.clone()
    };

    let bytes = fetch(http, &resolved).await?;
    let text = String::from_utf8(bytes)
        .map_err(|_| WorkflowError::TemplateInvalid(file.file.clone()))?;
    let rendered = render(&text, &ctx.form_data);

    let output_path = ctx.working_dir.join(&file.output);
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    write_atomic(&output_path, rendered.as_bytes()).await?;
    Ok(())
}

async fn fetch(http: &reqwest::Client, location: &str) -> EngineResult<Vec<u8>> {
    if let Some(path) = location.strip_prefix("file://") {
        return tokio::fs::read(path)
            .await
            .map_err(|_| WorkflowError::TemplateFileNotFound(path.into()));
    }
    if location.starts_with("http://") || location.starts_with("https://") {
        let response = http
            .get(location)
            .send()
            .await
            .map_err(WorkflowError::RepositoryNetworkError)?;
        if !response.status().is_success() {
            return Err(WorkflowError::RepositoryHttpError(response.status().as_u16()));
        }
        return response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(WorkflowError::RepositoryNetworkError);
    }
    tokio::fs::read(location)
        .await
        .map_err(|_| WorkflowError::TemplateFileNotFound(location.into()))
}

async fn write_atomic(path: &Path, contents: &[u8]) -> EngineResult<()> {
    let tmp_path = path.with_extension("tmp-write");
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Replace `{name}` placeholders with the matching form-data value,
/// stringified; unmatched placeholders are left verbatim.
fn render(template: &str, form_data: &FormData) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut key = String::new();
        let mut closed = false;
        for next in chars.by_ref() {
            if next == '}' {
                closed = true;
                break;
            }
            key.push(next);
        }
        if !closed {
            out.push('{');
            out.push_str(&key);
            continue;
        }
        match form_data.get(&key) {
            Some(serde_json::Value::String(s)) => out.push_str(s),
            Some(value) => out.push_str(&value.to_string()),
            None => {
                out.push('{');
                out.push_str(&key);
                out.push('}');
            }
        }
    }
    out
}

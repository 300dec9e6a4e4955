//! Reference shell executor: runs a `bash` command, streaming combined
//! stdout+stderr as `ShellOutput` events and failing on non-zero exit.
//!
//! Grounded on this codebase's process-spawning idioms: the line-buffered
//! `BufReader::lines()` forwarding loop from the Claude runner, and the
//! timeout/cancellation-aware `Command` setup from the hooks executor.

use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{EventStream, ExecutionContext, ScriptExecutor, EVENT_BUFFER};
use crate::error::WorkflowError;
use crate::model::{ResultEvent, Script};

const TAIL_LINES: usize = 40;

#[derive(Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("bash")
    }
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }
}

#[async_trait]
impl ScriptExecutor for ShellExecutor {
    async fn execute(&self, script: Script, ctx: ExecutionContext) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let Script::Bash { id: script_id, command } = script else {
            let kind = script.kind();
            let _ = tx.try_send(Err(WorkflowError::UnsupportedScriptType(kind)));
            return rx;
        };

        let shell = self.shell.clone();
        tokio::spawn(async move {
            run(shell, script_id, command, ctx, tx).await;
        });

        rx
    }
}

async fn run(
    shell: String,
    script_id: crate::model::ScriptId,
    command: String,
    ctx: ExecutionContext,
    tx: mpsc::Sender<crate::error::Result<ResultEvent>>,
) {
    let mut cmd = Command::new(&shell);
    cmd.arg("-lc")
        .arg(&command)
        .current_dir(&ctx.working_dir)
        .envs(&ctx.environment)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let _ = tx.send(Err(WorkflowError::ProcessFailed(e.to_string()))).await;
            return;
        }
    };

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let tail: std::sync::Arc<tokio::sync::Mutex<VecDeque<String>>> =
        std::sync::Arc::new(tokio::sync::Mutex::new(VecDeque::with_capacity(TAIL_LINES)));

    let stdout_task = spawn_reader(stdout, script_id.clone(), tx.clone(), tail.clone());
    let stderr_task = spawn_reader(stderr, script_id.clone(), tx.clone(), tail.clone());

    let wait = async {
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        child.wait().await
    };

    tokio::select! {
        status = wait => {
            match status {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let exit_code = status.code().unwrap_or(-1);
                    let tail_text = tail.lock().await.iter().cloned().collect::<Vec<_>>().join("\n");
                    let _ = tx
                        .send(Err(WorkflowError::CommandFailed { exit_code, tail: tail_text }))
                        .await;
                }
                Err(e) => {
                    let _ = tx.send(Err(WorkflowError::ProcessFailed(e.to_string()))).await;
                }
            }
        }
        _ = ctx.cancel.cancelled() => {
            let _ = child.kill().await;
        }
    }
}

fn spawn_reader<R>(
    reader: R,
    script_id: crate::model::ScriptId,
    tx: mpsc::Sender<crate::error::Result<ResultEvent>>,
    tail: std::sync::Arc<tokio::sync::Mutex<VecDeque<String>>>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            {
                let mut tail = tail.lock().await;
                if tail.len() == TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.clone());
            }
            if tx
                .send(Ok(ResultEvent::ShellOutput {
                    script_id: script_id.clone(),
                    chunk: line,
                }))
                .await
                .is_err()
            {
                break;
            }
        }
    })
}

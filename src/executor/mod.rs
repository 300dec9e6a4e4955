//! Script Executor Interface: the uniform contract the scheduler consumes
//! from every script kind, plus the two reference implementations this crate
//! ships (`shell`, `template`).

pub mod shell;
pub mod template;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::model::{FormData, ResultEvent, Script};
use crate::source::RepositorySource;

/// Everything an executor needs to run one script: the node's working
/// directory, its effective environment, the form data accumulated so far,
/// and an optional handle to the repository source template scripts resolve
/// files through.
#[derive(Clone)]
pub struct ExecutionContext {
    pub working_dir: PathBuf,
    pub environment: HashMap<String, String>,
    pub form_data: FormData,
    pub repository_source: Option<Arc<dyn RepositorySource>>,
    pub repository_path: Option<String>,
    pub cancel: CancellationToken,
}

/// Each item is either a successfully produced event or the single
/// terminating failure of the sequence; once an `Err` is sent the channel is
/// closed by the producing task.
pub type EventStream = mpsc::Receiver<Result<ResultEvent>>;

#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Run `script`, streaming result events through the returned channel.
    /// The channel is consumed exactly once. Dropping the receiver (or
    /// cancelling `ctx.cancel`) must interrupt in-flight work.
    async fn execute(&self, script: Script, ctx: ExecutionContext) -> EventStream;
}

/// Bounded channel capacity used by the reference executors; sized to absorb
/// a burst of output lines without blocking the producing task on every send.
pub const EVENT_BUFFER: usize = 64;

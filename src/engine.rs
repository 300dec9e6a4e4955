//! Engine: the top-level entry point wiring the DAG Builder, Scheduler,
//! Result Aggregator and Snapshot Projector together behind a single
//! `execute()` operation, plus the form-rendezvous and path-lookup side
//! operations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::executor::shell::ShellExecutor;
use crate::executor::template::TemplateExecutor;
use crate::executor::ScriptExecutor;
use crate::graph::{DagBuilder, WorkflowGraph};
use crate::model::{FormData, ResultEvent, Workflow};
use crate::path;
use crate::rendezvous::RendezvousTable;
use crate::scheduler::{FormCallback, Scheduler};
use crate::snapshot::WorkflowSnapshot;
use crate::source::RepositorySource;

pub struct EngineBuilder {
    config: EngineConfig,
    repository_source: Option<Arc<dyn RepositorySource>>,
    repository_path: Option<String>,
    form_callback: Option<Arc<dyn FormCallback>>,
    javascript_executor: Option<Arc<dyn ScriptExecutor>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            repository_source: None,
            repository_path: None,
            form_callback: None,
            javascript_executor: None,
        }
    }

    /// Supply the repository source template scripts resolve and fetch files
    /// through, and the sub-path within it this run should use.
    pub fn repository_source(mut self, source: Arc<dyn RepositorySource>, path: impl Into<String>) -> Self {
        self.repository_source = Some(source);
        self.repository_path = Some(path.into());
        self
    }

    /// Switch form requests to callback mode: no `waitForFormData` rendezvous
    /// is used, the callback is awaited directly instead.
    pub fn form_callback(mut self, callback: Arc<dyn FormCallback>) -> Self {
        self.form_callback = Some(callback);
        self
    }

    /// Supply a concrete JavaScript script executor. Without one, a
    /// `javascript`-typed script fails with `UnsupportedScriptType`.
    pub fn javascript_executor(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        self.javascript_executor = Some(executor);
        self
    }

    /// Build the DAG for `workflow` and wire up the scheduler. DAG-build
    /// errors (duplicate ids, missing dependencies, cycles) surface here,
    /// before `execute()` emits a single event.
    pub fn build(self, workflow: &Workflow) -> Result<Engine> {
        let graph = DagBuilder::build(workflow)?;

        let mut environment: HashMap<String, String> = std::env::vars().collect();
        environment.extend(self.config.environment.clone());
        environment.extend(workflow.environment.clone());

        let rendezvous = RendezvousTable::new();

        let scheduler = Scheduler::new(
            Arc::new(ShellExecutor::new(self.config.default_shell.clone())),
            Arc::new(TemplateExecutor::default()),
            self.javascript_executor,
            rendezvous.clone(),
            self.form_callback,
            self.repository_source,
            self.repository_path,
            self.config.working_directory.clone(),
            environment,
        );

        Ok(Engine {
            graph: Arc::new(Mutex::new(graph)),
            scheduler: Arc::new(scheduler),
            rendezvous,
            event_buffer: self.config.event_buffer,
        })
    }
}

pub struct Engine {
    graph: Arc<Mutex<WorkflowGraph>>,
    scheduler: Arc<Scheduler>,
    rendezvous: RendezvousTable,
    event_buffer: usize,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Run the graph to completion, streaming `(snapshot, event)` pairs. The
    /// final item is `Err` if the run failed; otherwise the channel simply
    /// closes once every node has completed.
    pub fn execute(&self) -> mpsc::Receiver<Result<(WorkflowSnapshot, ResultEvent)>> {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let graph = self.graph.clone();
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run(&graph, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        rx
    }

    /// Fulfil a pending or future `waitForFormData(id)` with `data`. Ignored
    /// if `id` has already been fulfilled once.
    pub async fn provide_form_data(&self, id: &str, data: FormData) {
        self.rendezvous.provide(id, data).await;
    }

    /// Suspend until `id`'s form data arrives (or return immediately if it
    /// was already provided). Exposed for callers driving pull-mode forms
    /// themselves instead of supplying a `FormCallback`.
    pub async fn wait_for_form_data(&self, id: &str) -> FormData {
        self.rendezvous.wait_for(id).await
    }

    /// Resolve a dotted path (§4.8) against the graph's current state.
    pub async fn lookup(&self, path: &str) -> Result<serde_json::Value> {
        let graph = self.graph.lock().await;
        path::lookup(&graph, path)
    }
}

//! Scheduler: executes the graph built by the DAG Builder. Runs ready nodes
//! concurrently, serialises scripts within a node, drains their result
//! streams into a single ordered outer sequence, and propagates cancellation
//! on failure.
//!
//! Grounded on this codebase's parallel task executor: a semaphore-free
//! worker-per-ready-node pool reporting back through a single result
//! channel, the way the executor module's `ParallelExecutor` fans work out
//! and collects it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use petgraph::graph::NodeIndex;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::aggregator;
use crate::error::{Result, WorkflowError};
use crate::executor::{ExecutionContext, ScriptExecutor};
use crate::expander::{self, ExpandedScript};
use crate::graph::WorkflowGraph;
use crate::model::{FormData, FormSchema, Job, ScriptId, ScriptKind};
use crate::rendezvous::RendezvousTable;
use crate::snapshot::{self, WorkflowSnapshot};
use crate::source::RepositorySource;

/// Supplied at engine construction to answer `formRequest`s synchronously
/// instead of the caller driving `provideFormData`/`waitForFormData`.
#[async_trait]
pub trait FormCallback: Send + Sync {
    async fn on_form_request(&self, schema: &FormSchema) -> FormData;
}

enum NodeMsg {
    Event { node: NodeIndex, event: crate::model::ResultEvent },
    JobFormData { node: NodeIndex, data: FormData },
    Done { node: NodeIndex },
    Failed { node: NodeIndex, script_id: ScriptId, error: WorkflowError },
}

pub struct Scheduler {
    shell: Arc<dyn ScriptExecutor>,
    template: Arc<dyn ScriptExecutor>,
    javascript: Option<Arc<dyn ScriptExecutor>>,
    rendezvous: RendezvousTable,
    form_callback: Option<Arc<dyn FormCallback>>,
    repository_source: Option<Arc<dyn RepositorySource>>,
    repository_path: Option<String>,
    working_dir: PathBuf,
    base_environment: HashMap<String, String>,
    sequence: AtomicU64,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shell: Arc<dyn ScriptExecutor>,
        template: Arc<dyn ScriptExecutor>,
        javascript: Option<Arc<dyn ScriptExecutor>>,
        rendezvous: RendezvousTable,
        form_callback: Option<Arc<dyn FormCallback>>,
        repository_source: Option<Arc<dyn RepositorySource>>,
        repository_path: Option<String>,
        working_dir: PathBuf,
        base_environment: HashMap<String, String>,
    ) -> Self {
        Self {
            shell,
            template,
            javascript,
            rendezvous,
            form_callback,
            repository_source,
            repository_path,
            working_dir,
            base_environment,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Run the whole graph to completion, streaming `(snapshot, event)` pairs
    /// into `out_tx`. Returns the terminating error, if any; the caller has
    /// already received every successful event by the time this returns.
    ///
    /// The graph is exclusively mutated here: per-node tasks only ever push
    /// events through `node_tx`, never touch `graph` directly.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        graph: &Arc<Mutex<WorkflowGraph>>,
        out_tx: &mpsc::Sender<Result<(WorkflowSnapshot, crate::model::ResultEvent)>>,
    ) -> Result<()> {
        let (node_tx, mut node_rx) = mpsc::channel::<NodeMsg>(256);
        let cancel = CancellationToken::new();

        let mut completed: HashSet<NodeIndex> = HashSet::new();
        let mut in_progress: HashSet<NodeIndex> = HashSet::new();
        let mut ready: VecDeque<NodeIndex> = VecDeque::from([graph.lock().await.root()]);

        loop {
            while let Some(node_idx) = ready.pop_front() {
                in_progress.insert(node_idx);
                let job = graph.lock().await.node(node_idx).job.clone();
                self.spawn_node(node_idx, job, node_tx.clone(), cancel.clone());
            }

            if in_progress.is_empty() {
                break;
            }

            match node_rx.recv().await {
                Some(NodeMsg::Event { node, event }) => {
                    let snapshot = {
                        let mut g = graph.lock().await;
                        aggregator::aggregate_event(&mut g.node_mut(node).job, &event);
                        snapshot::project(&g)
                    };
                    if out_tx.send(Ok((snapshot, event))).await.is_err() {
                        cancel.cancel();
                        return Ok(());
                    }
                }
                Some(NodeMsg::JobFormData { node, data }) => {
                    graph.lock().await.node_mut(node).job.form_data = data;
                }
                Some(NodeMsg::Done { node }) => {
                    in_progress.remove(&node);
                    completed.insert(node);
                    let g = graph.lock().await;
                    for child in g.children(node) {
                        if completed.contains(&child) || in_progress.contains(&child) {
                            continue;
                        }
                        if g.parents(child).iter().all(|p| completed.contains(p)) {
                            ready.push_back(child);
                        }
                    }
                }
                Some(NodeMsg::Failed { node, script_id, error }) => {
                    aggregator::mark_failure(&mut graph.lock().await.node_mut(node).job, &script_id);
                    cancel.cancel();
                    return Err(error);
                }
                None => break,
            }
        }

        Ok(())
    }

    fn spawn_node(
        &self,
        node: NodeIndex,
        job: Job,
        node_tx: mpsc::Sender<NodeMsg>,
        cancel: CancellationToken,
    ) {
        let shell = self.shell.clone();
        let template = self.template.clone();
        let javascript = self.javascript.clone();
        let rendezvous = self.rendezvous.clone();
        let form_callback = self.form_callback.clone();
        let repository_source = self.repository_source.clone();
        let repository_path = self.repository_path.clone();
        let working_dir = self.working_dir.join(job.id.as_str());
        let mut environment = self.base_environment.clone();
        environment.extend(job.environment.clone());
        let sequence = self.next_sequence();

        tokio::spawn(async move {
            run_node(
                node,
                job,
                NodeDeps {
                    shell,
                    template,
                    javascript,
                    rendezvous,
                    form_callback,
                    repository_source,
                    repository_path,
                    working_dir,
                    environment,
                    cancel,
                },
                sequence,
                node_tx,
            )
            .await;
        });
    }
}

struct NodeDeps {
    shell: Arc<dyn ScriptExecutor>,
    template: Arc<dyn ScriptExecutor>,
    javascript: Option<Arc<dyn ScriptExecutor>>,
    rendezvous: RendezvousTable,
    form_callback: Option<Arc<dyn FormCallback>>,
    repository_source: Option<Arc<dyn RepositorySource>>,
    repository_path: Option<String>,
    working_dir: PathBuf,
    environment: HashMap<String, String>,
    cancel: CancellationToken,
}

async fn run_node(node: NodeIndex, job: Job, deps: NodeDeps, sequence: u64, node_tx: mpsc::Sender<NodeMsg>) {
    if let Err(e) = tokio::fs::create_dir_all(&deps.working_dir).await {
        let _ = node_tx
            .send(NodeMsg::Failed {
                node,
                script_id: ScriptId::from("<job-setup>"),
                error: WorkflowError::Io(e),
            })
            .await;
        return;
    }

    let mut job_form_data = FormData::new();
    if let Some(schema) = &job.form {
        let rendezvous_id = format!("job_{}_{}", job.id.as_str(), sequence);
        let event = crate::model::ResultEvent::FormRequest {
            script_id: ScriptId::from(rendezvous_id.as_str()),
            rendezvous_id: rendezvous_id.clone(),
            schema: schema.clone(),
        };
        if node_tx.send(NodeMsg::Event { node, event }).await.is_err() {
            return;
        }
        job_form_data = resolve_form(&deps, schema, &rendezvous_id).await;
        let _ = node_tx
            .send(NodeMsg::JobFormData { node, data: job_form_data.clone() })
            .await;
    }

    for expanded in expander::expand(&job) {
        let mut scoped_form_data = job_form_data.clone();

        if let ExpandedScript::StepMain { step_id_index, .. } = &expanded {
            if let Some(schema) = job.steps[*step_id_index].form.clone() {
                let step_id = job.steps[*step_id_index].id.as_str();
                let rendezvous_id = format!("step_{step_id}_{sequence}");
                let event = crate::model::ResultEvent::FormRequest {
                    script_id: expanded.script_id().clone(),
                    rendezvous_id: rendezvous_id.clone(),
                    schema: schema.clone(),
                };
                if node_tx.send(NodeMsg::Event { node, event }).await.is_err() {
                    return;
                }
                let step_data = resolve_form(&deps, &schema, &rendezvous_id).await;
                scoped_form_data.extend(step_data);
            }
        }

        let script = expanded.script().clone();
        let script_id = expanded.script_id().clone();

        let executor = match pick_executor(&deps, script.kind()) {
            Ok(executor) => executor,
            Err(error) => {
                let _ = node_tx.send(NodeMsg::Failed { node, script_id, error }).await;
                return;
            }
        };

        let ctx = ExecutionContext {
            working_dir: deps.working_dir.clone(),
            environment: deps.environment.clone(),
            form_data: scoped_form_data,
            repository_source: deps.repository_source.clone(),
            repository_path: deps.repository_path.clone(),
            cancel: deps.cancel.clone(),
        };

        let mut rx = executor.execute(script, ctx).await;
        let mut failed = false;
        while let Some(item) = rx.recv().await {
            match item {
                Ok(event) => {
                    if node_tx.send(NodeMsg::Event { node, event }).await.is_err() {
                        return;
                    }
                }
                Err(error) => {
                    failed = true;
                    let _ = node_tx
                        .send(NodeMsg::Failed { node, script_id: script_id.clone(), error })
                        .await;
                    break;
                }
            }
        }
        if failed {
            return;
        }

        let boundary = crate::model::ResultEvent::StepBoundary { script_id };
        if node_tx.send(NodeMsg::Event { node, event: boundary }).await.is_err() {
            return;
        }
    }

    debug!(job_id = %job.id, "node finished");
    let _ = node_tx.send(NodeMsg::Done { node }).await;
}

fn pick_executor(deps: &NodeDeps, kind: ScriptKind) -> std::result::Result<Arc<dyn ScriptExecutor>, WorkflowError> {
    match kind {
        ScriptKind::Bash => Ok(deps.shell.clone()),
        ScriptKind::Template => Ok(deps.template.clone()),
        ScriptKind::Javascript => deps
            .javascript
            .clone()
            .ok_or(WorkflowError::UnsupportedScriptType(ScriptKind::Javascript)),
    }
}

async fn resolve_form(deps: &NodeDeps, schema: &FormSchema, rendezvous_id: &str) -> FormData {
    if let Some(callback) = &deps.form_callback {
        return callback.on_form_request(schema).await;
    }
    deps.rendezvous.wait_for(rendezvous_id).await
}

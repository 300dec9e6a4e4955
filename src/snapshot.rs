//! Snapshot Projector: copies the live mutable graph into an immutable,
//! workflow-shaped snapshot after each event. Root/tail nodes are invisible
//! as jobs; their steps surface as workflow-level `setup`/`teardown`
//! lifecycle events instead.

use serde::Serialize;

use crate::graph::WorkflowGraph;
use crate::model::{FormData, GlobalConfig, Job, JobId, LifecycleEvent, LifecycleEventId, LifecyclePhase, Status, Step};
use crate::status::{self, DerivedStatus};

#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: Option<String>,
    pub needs: Vec<JobId>,
    pub steps: Vec<Step>,
    pub lifecycle: Vec<LifecycleEvent>,
    pub form_data: FormData,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSnapshot {
    pub global_config: GlobalConfig,
    pub setup: Vec<LifecycleEvent>,
    pub teardown: Vec<LifecycleEvent>,
    pub jobs: Vec<JobSnapshot>,
    pub status: Status,
}

fn steps_as_lifecycle(steps: &[Step], phase: LifecyclePhase) -> Vec<LifecycleEvent> {
    steps
        .iter()
        .map(|step| LifecycleEvent {
            id: LifecycleEventId(step.id.0.clone()),
            on: phase,
            script: step.script.clone(),
            results: step.results.clone(),
            status: step.status.clone(),
        })
        .collect()
}

pub fn project(graph: &WorkflowGraph) -> WorkflowSnapshot {
    let root_job: &Job = &graph.node(graph.root()).job;
    let tail_job: &Job = &graph.node(graph.tail()).job;

    let setup = steps_as_lifecycle(&root_job.steps, LifecyclePhase::Setup);
    let teardown = steps_as_lifecycle(&tail_job.steps, LifecyclePhase::Teardown);

    let mut jobs = Vec::new();
    let mut job_statuses: Vec<DerivedStatus> = Vec::new();

    for idx in graph.job_indices() {
        let job = &graph.node(idx).job;
        let derived = status::job_status(job);
        job_statuses.push(derived.clone());
        jobs.push(JobSnapshot {
            id: job.id.clone(),
            name: job.name.clone(),
            needs: job.needs.clone(),
            steps: job.steps.clone(),
            lifecycle: job.lifecycle.clone(),
            form_data: job.form_data.clone(),
            status: derived.status,
        });
    }

    let workflow_status = status::workflow_status(&job_statuses);

    WorkflowSnapshot {
        global_config: graph.global_config.clone(),
        setup,
        teardown,
        jobs,
        status: workflow_status.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DagBuilder;
    use crate::model::{Script, ScriptId, StepId, Workflow};

    #[test]
    fn root_and_tail_steps_never_appear_as_jobs() {
        let workflow = Workflow {
            jobs: vec![Job {
                id: JobId::from("a"),
                steps: vec![Step {
                    id: StepId::from("s"),
                    name: None,
                    form: None,
                    condition: None,
                    script: Script::Bash {
                        id: ScriptId::from("sc"),
                        command: "echo a".into(),
                    },
                    lifecycle: Vec::new(),
                    results: Vec::new(),
                    status: Default::default(),
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let graph = DagBuilder::build(&workflow).unwrap();
        let snapshot = project(&graph);
        assert_eq!(snapshot.jobs.len(), 1);
        assert!(snapshot.jobs.iter().all(|j| j.id.as_str() != "root" && j.id.as_str() != "tail"));
    }

    #[test]
    fn empty_workflow_snapshot_is_not_started() {
        let workflow = Workflow::default();
        let graph = DagBuilder::build(&workflow).unwrap();
        let snapshot = project(&graph);
        assert!(snapshot.jobs.is_empty());
        assert_eq!(snapshot.status, Status::NotStarted);
    }
}

//! Job Step Expander: flattens a job into the ordered sequence of scripts a
//! single node execution runs.

use crate::model::{Job, LifecyclePhase, Script, ScriptId};

/// One entry of an expanded script sequence, tagged with the slot the
/// aggregator should route its results to.
#[derive(Debug, Clone)]
pub enum ExpandedScript {
    /// A job-scoped `beforeJob`/`afterJob` lifecycle script, cloned under its
    /// owning lifecycle event's id.
    JobLifecycle { script: Script },
    /// A step's own main script.
    StepMain { step_id_index: usize, script: Script },
    /// A step-scoped `beforeStep`/`afterStep` lifecycle script, cloned under
    /// its owning lifecycle event's id.
    StepLifecycle { step_id_index: usize, script: Script },
}

impl ExpandedScript {
    pub fn script(&self) -> &Script {
        match self {
            ExpandedScript::JobLifecycle { script } => script,
            ExpandedScript::StepMain { script, .. } => script,
            ExpandedScript::StepLifecycle { script, .. } => script,
        }
    }

    pub fn script_id(&self) -> &ScriptId {
        self.script().id()
    }
}

/// Expand `job` into its ordered script sequence: `beforeJob`, then for each
/// step in declaration order `beforeStep*`, the step's main script,
/// `afterStep*`, finally `afterJob`.
///
/// Applying this to the same job always yields an identical sequence: same
/// order, same per-lifecycle cloned ids, because it only reads `job` and
/// never consults external state.
pub fn expand(job: &Job) -> Vec<ExpandedScript> {
    let mut out = Vec::new();

    for event in job.lifecycle_of(LifecyclePhase::BeforeJob) {
        out.push(ExpandedScript::JobLifecycle {
            script: event.script.cloned_with_id(ScriptId(event.id.0.clone())),
        });
    }

    for (index, step) in job.steps.iter().enumerate() {
        for event in step.lifecycle_of(LifecyclePhase::BeforeStep) {
            out.push(ExpandedScript::StepLifecycle {
                step_id_index: index,
                script: event.script.cloned_with_id(ScriptId(event.id.0.clone())),
            });
        }

        out.push(ExpandedScript::StepMain {
            step_id_index: index,
            script: step.script.clone(),
        });

        for event in step.lifecycle_of(LifecyclePhase::AfterStep) {
            out.push(ExpandedScript::StepLifecycle {
                step_id_index: index,
                script: event.script.cloned_with_id(ScriptId(event.id.0.clone())),
            });
        }
    }

    for event in job.lifecycle_of(LifecyclePhase::AfterJob) {
        out.push(ExpandedScript::JobLifecycle {
            script: event.script.cloned_with_id(ScriptId(event.id.0.clone())),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{JobId, LifecycleEvent, LifecycleEventId, Step, StepId};

    fn bash(id: &str, cmd: &str) -> Script {
        Script::Bash {
            id: ScriptId::from(id),
            command: cmd.to_string(),
        }
    }

    #[test]
    fn orders_lifecycle_around_step() {
        let job = Job {
            id: JobId::from("j"),
            steps: vec![Step {
                id: StepId::from("s1"),
                name: None,
                form: None,
                condition: None,
                script: bash("main", "echo 3"),
                lifecycle: vec![
                    LifecycleEvent::new(
                        LifecycleEventId::from("before"),
                        LifecyclePhase::BeforeStep,
                        bash("before-raw", "echo 2"),
                    ),
                    LifecycleEvent::new(
                        LifecycleEventId::from("after"),
                        LifecyclePhase::AfterStep,
                        bash("after-raw", "echo 4"),
                    ),
                ],
                results: Vec::new(),
                status: Default::default(),
            }],
            ..Default::default()
        };

        let expanded = expand(&job);
        let ids: Vec<&str> = expanded.iter().map(|e| e.script_id().as_str()).collect();
        assert_eq!(ids, vec!["before", "main", "after"]);
    }

    #[test]
    fn expansion_is_idempotent() {
        let job = Job {
            id: JobId::from("j"),
            steps: vec![Step {
                id: StepId::from("s1"),
                name: None,
                form: None,
                condition: None,
                script: bash("main", "echo hi"),
                lifecycle: Vec::new(),
                results: Vec::new(),
                status: Default::default(),
            }],
            ..Default::default()
        };

        let first: Vec<String> = expand(&job).iter().map(|e| e.script_id().to_string()).collect();
        let second: Vec<String> = expand(&job).iter().map(|e| e.script_id().to_string()).collect();
        assert_eq!(first, second);
    }
}

//! Path Lookup: a dotted-path grammar over the live graph.
//!
//! `jobs[index]` or `jobs.id` selects a node; `.steps[index]` or `.steps.id`
//! selects a step; a trailing `.results` returns the result log; a trailing
//! `.formData` returns the last accepted form map.

use std::iter::Peekable;
use std::str::Split;

use petgraph::graph::NodeIndex;

use crate::error::{Result, WorkflowError};
use crate::graph::WorkflowGraph;
use crate::model::{Job, JobId, Step, StepId};

type Tokens<'a> = Peekable<Split<'a, char>>;

fn invalid(reason: impl Into<String>) -> WorkflowError {
    WorkflowError::InvalidPath(reason.into())
}

fn parse_bracket_index(token: &str, prefix: &str) -> Option<Result<usize>> {
    let inner = token.strip_prefix(prefix)?.strip_suffix(']')?;
    Some(inner.parse::<usize>().map_err(|_| invalid(format!("not an index: {inner}"))))
}

fn resolve_job<'g>(graph: &'g WorkflowGraph, first: &str, tokens: &mut Tokens) -> Result<NodeIndex> {
    if let Some(index_result) = parse_bracket_index(first, "jobs[") {
        let index = index_result?;
        return graph
            .job_indices()
            .get(index)
            .copied()
            .ok_or_else(|| invalid(format!("job index out of bounds: {index}")));
    }

    if first == "jobs" {
        let id_token = tokens
            .next()
            .ok_or_else(|| invalid("expected a job id after 'jobs'"))?;
        return graph
            .index_of(&JobId::from(id_token))
            .filter(|&idx| !graph.is_root_or_tail(idx))
            .ok_or_else(|| invalid(format!("unknown job id: {id_token}")));
    }

    Err(invalid(format!("expected 'jobs[index]' or 'jobs', got '{first}'")))
}

fn resolve_step<'j>(job: &'j Job, token: &str, tokens: &mut Tokens) -> Result<&'j Step> {
    if let Some(index_result) = parse_bracket_index(token, "steps[") {
        let index = index_result?;
        return job
            .steps
            .get(index)
            .ok_or_else(|| invalid(format!("step index out of bounds: {index}")));
    }

    if token == "steps" {
        let id_token = tokens
            .next()
            .ok_or_else(|| invalid("expected a step id after 'steps'"))?;
        let step_id = StepId::from(id_token);
        return job
            .steps
            .iter()
            .find(|s| s.id == step_id)
            .ok_or_else(|| invalid(format!("unknown step id: {id_token}")));
    }

    Err(invalid(format!("expected 'steps[index]' or 'steps', got '{token}'")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| invalid(format!("could not serialize value: {e}")))
}

/// Resolve a dotted path against the live graph.
pub fn lookup(graph: &WorkflowGraph, path: &str) -> Result<serde_json::Value> {
    let mut tokens: Tokens = path.split('.').peekable();
    let first = tokens.next().ok_or_else(|| invalid("empty path"))?;

    let job_idx = resolve_job(graph, first, &mut tokens)?;
    let job = &graph.node(job_idx).job;

    let Some(next) = tokens.next() else {
        return to_json(job);
    };

    if next == "formData" {
        return to_json(&job.form_data);
    }

    let step = resolve_step(job, next, &mut tokens)?;

    match tokens.next() {
        None => to_json(step),
        Some("results") => to_json(&step.results),
        Some("formData") => Err(invalid("steps do not carry form data")),
        Some(other) => Err(invalid(format!("unknown path segment: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DagBuilder;
    use crate::model::{Script, ScriptId, Workflow};

    fn sample_graph() -> WorkflowGraph {
        let workflow = Workflow {
            jobs: vec![Job {
                id: JobId::from("build"),
                steps: vec![Step {
                    id: StepId::from("compile"),
                    name: None,
                    form: None,
                    condition: None,
                    script: Script::Bash {
                        id: ScriptId::from("compile-script"),
                        command: "echo build".into(),
                    },
                    lifecycle: Vec::new(),
                    results: Vec::new(),
                    status: Default::default(),
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        DagBuilder::build(&workflow).unwrap()
    }

    #[test]
    fn indexed_and_named_job_lookup_agree() {
        let graph = sample_graph();
        let by_index = lookup(&graph, "jobs[0]").unwrap();
        let by_id = lookup(&graph, "jobs.build").unwrap();
        assert_eq!(by_index, by_id);
    }

    #[test]
    fn nested_step_results_lookup() {
        let graph = sample_graph();
        let results = lookup(&graph, "jobs.build.steps.compile.results").unwrap();
        assert_eq!(results, serde_json::json!([]));
    }

    #[test]
    fn out_of_bounds_index_is_invalid_path() {
        let graph = sample_graph();
        assert!(matches!(lookup(&graph, "jobs[5]"), Err(WorkflowError::InvalidPath(_))));
    }

    #[test]
    fn root_and_tail_are_not_addressable_as_jobs() {
        let graph = sample_graph();
        assert!(lookup(&graph, "jobs.root").is_err());
    }
}

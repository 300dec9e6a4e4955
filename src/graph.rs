//! DAG Builder: turns a job list into a graph with synthetic root/tail nodes,
//! validates `needs` references, detects cycles, and promotes workflow-level
//! `setup`/`teardown` scripts onto those synthetic nodes.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Result, WorkflowError};
use crate::model::{
    GlobalConfig, Job, JobId, LifecycleEvent, LifecyclePhase, Step, StepId, Workflow,
    ROOT_JOB_ID, TAIL_JOB_ID,
};

/// A DAG vertex wrapping a job. Root and tail are synthetic: they are never
/// reported as jobs by the snapshot projector.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub job: Job,
}

#[derive(Debug)]
pub struct WorkflowGraph {
    graph: DiGraph<GraphNode, ()>,
    index: HashMap<JobId, NodeIndex>,
    root: NodeIndex,
    tail: NodeIndex,
    pub global_config: GlobalConfig,
}

impl WorkflowGraph {
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn tail(&self) -> NodeIndex {
        self.tail
    }

    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut GraphNode {
        &mut self.graph[idx]
    }

    pub fn index_of(&self, id: &JobId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn parents(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.source())
            .collect()
    }

    pub fn children(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.target())
            .collect()
    }

    pub fn is_root_or_tail(&self, idx: NodeIndex) -> bool {
        idx == self.root || idx == self.tail
    }

    /// All node indices in insertion order, including root and tail.
    pub fn all_indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Job nodes only, excluding the synthetic root/tail endpoints, in the
    /// order they were declared in the source document.
    pub fn job_indices(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| !self.is_root_or_tail(idx))
            .collect()
    }
}

pub struct DagBuilder;

impl DagBuilder {
    /// Build the graph for a decoded workflow document.
    pub fn build(workflow: &Workflow) -> Result<WorkflowGraph> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        let root = graph.add_node(GraphNode {
            job: Job {
                id: JobId::from(ROOT_JOB_ID),
                ..Default::default()
            },
        });
        let tail = graph.add_node(GraphNode {
            job: Job {
                id: JobId::from(TAIL_JOB_ID),
                ..Default::default()
            },
        });

        for job in &workflow.jobs {
            if index.contains_key(&job.id) {
                return Err(WorkflowError::DuplicateNode(job.id.clone()));
            }
            let idx = graph.add_node(GraphNode { job: job.clone() });
            index.insert(job.id.clone(), idx);
        }

        for job in &workflow.jobs {
            let job_idx = index[&job.id];
            for dep_id in &job.needs {
                let dep_idx = index.get(dep_id).ok_or_else(|| WorkflowError::MissingDependency {
                    job_id: job.id.clone(),
                    dep_id: dep_id.clone(),
                })?;
                graph.add_edge(*dep_idx, job_idx, ());
            }
            if job.needs.is_empty() {
                graph.add_edge(root, job_idx, ());
            }
        }

        for &idx in index.values() {
            let has_outgoing = graph.edges_directed(idx, Direction::Outgoing).next().is_some();
            if !has_outgoing {
                graph.add_edge(idx, tail, ());
            }
        }

        if graph.edges_directed(root, Direction::Outgoing).next().is_none() {
            graph.add_edge(root, tail, ());
        }

        let mut wg = WorkflowGraph {
            graph,
            index,
            root,
            tail,
            global_config: workflow.global_config.clone(),
        };

        promote(&mut wg.graph[root].job, &workflow.lifecycle, LifecyclePhase::Setup);
        promote(&mut wg.graph[tail].job, &workflow.lifecycle, LifecyclePhase::Teardown);

        check_acyclic(&wg)?;

        Ok(wg)
    }
}

/// Turn every workflow-level lifecycle event of the given phase into a
/// synthesized step on `job`, reusing the lifecycle event's own identifier so
/// the snapshot projector can map it back.
fn promote(job: &mut Job, lifecycle: &[LifecycleEvent], phase: LifecyclePhase) {
    for event in lifecycle.iter().filter(|e| e.on == phase) {
        job.steps.push(Step {
            id: StepId(event.id.0.clone()),
            name: None,
            form: None,
            condition: None,
            script: event.script.clone(),
            lifecycle: Vec::new(),
            results: Vec::new(),
            status: Default::default(),
        });
    }
}

fn check_acyclic(wg: &WorkflowGraph) -> Result<()> {
    #[derive(PartialEq, Clone, Copy)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let starts = wg.job_indices();
    let mut marks: HashMap<NodeIndex, Mark> =
        starts.iter().map(|&idx| (idx, Mark::Unvisited)).collect();

    for start in starts {
        if marks[&start] != Mark::Unvisited {
            continue;
        }
        let mut stack = vec![(start, wg.children(start).into_iter())];
        let mut path = vec![start];
        marks.insert(start, Mark::InProgress);

        'outer: while let Some((node, iter)) = stack.last_mut() {
            let node = *node;
            for next in iter.by_ref() {
                if wg.is_root_or_tail(next) {
                    continue;
                }
                match marks.get(&next).copied().unwrap_or(Mark::Unvisited) {
                    Mark::InProgress => {
                        let cycle_start = path.iter().position(|&n| n == next).unwrap_or(0);
                        let path_ids: Vec<JobId> = path[cycle_start..]
                            .iter()
                            .map(|&idx| wg.node(idx).job.id.clone())
                            .collect();
                        return Err(WorkflowError::CyclicDependency(path_ids));
                    }
                    Mark::Done => continue,
                    Mark::Unvisited => {
                        marks.insert(next, Mark::InProgress);
                        path.push(next);
                        stack.push((next, wg.children(next).into_iter()));
                        continue 'outer;
                    }
                }
            }
            marks.insert(node, Mark::Done);
            path.pop();
            stack.pop();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Script, ScriptId};

    fn bash_job(id: &str, needs: &[&str]) -> Job {
        Job {
            id: JobId::from(id),
            needs: needs.iter().map(|n| JobId::from(*n)).collect(),
            steps: vec![Step {
                id: StepId::from(format!("{id}-step").as_str()),
                name: None,
                form: None,
                condition: None,
                script: Script::Bash {
                    id: ScriptId::from(format!("{id}-script").as_str()),
                    command: format!("echo {id}"),
                },
                lifecycle: Vec::new(),
                results: Vec::new(),
                status: Default::default(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn empty_workflow_links_root_to_tail() {
        let workflow = Workflow::default();
        let graph = DagBuilder::build(&workflow).unwrap();
        assert_eq!(graph.children(graph.root()), vec![graph.tail()]);
    }

    #[test]
    fn linear_chain_has_no_cycle_and_resolves_edges() {
        let workflow = Workflow {
            jobs: vec![bash_job("a", &[]), bash_job("b", &["a"])],
            ..Default::default()
        };
        let graph = DagBuilder::build(&workflow).unwrap();
        let a = graph.index_of(&JobId::from("a")).unwrap();
        let b = graph.index_of(&JobId::from("b")).unwrap();
        assert!(graph.children(a).contains(&b));
        assert!(graph.children(graph.root()).contains(&a));
        assert!(graph.children(b).contains(&graph.tail()));
    }

    #[test]
    fn duplicate_job_id_rejected() {
        let workflow = Workflow {
            jobs: vec![bash_job("a", &[]), bash_job("a", &[])],
            ..Default::default()
        };
        assert!(matches!(
            DagBuilder::build(&workflow),
            Err(WorkflowError::DuplicateNode(_))
        ));
    }

    #[test]
    fn missing_dependency_rejected() {
        let workflow = Workflow {
            jobs: vec![bash_job("a", &["ghost"])],
            ..Default::default()
        };
        assert!(matches!(
            DagBuilder::build(&workflow),
            Err(WorkflowError::MissingDependency { .. })
        ));
    }

    #[test]
    fn cycle_rejected_with_full_path() {
        let workflow = Workflow {
            jobs: vec![bash_job("a", &["c"]), bash_job("b", &["a"]), bash_job("c", &["b"])],
            ..Default::default()
        };
        match DagBuilder::build(&workflow) {
            Err(WorkflowError::CyclicDependency(path)) => {
                let names: HashSet<&str> = path.iter().map(|id| id.as_str()).collect();
                assert_eq!(names, HashSet::from(["a", "b", "c"]));
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }
}

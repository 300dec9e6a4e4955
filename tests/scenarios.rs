//! End-to-end scenarios driving the engine against real `bash` through
//! decoded YAML documents, matching the concrete scenarios used to validate
//! the scheduler's topological and concurrency guarantees.

use std::sync::Arc;
use std::time::Duration;

use stepgraph::config::EngineConfig;
use stepgraph::engine::Engine;
use stepgraph::model::{FormData, ResultEvent, Status};
use stepgraph::source::decode_workflow;

fn config(tag: &str) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.working_directory = std::env::temp_dir().join(format!("stepgraph-scenario-{tag}"));
    config
}

async fn drain(
    mut rx: tokio::sync::mpsc::Receiver<stepgraph::error::Result<(stepgraph::snapshot::WorkflowSnapshot, ResultEvent)>>,
) -> (Vec<ResultEvent>, Option<stepgraph::error::WorkflowError>) {
    let mut events = Vec::new();
    let mut failure = None;
    while let Some(item) = rx.recv().await {
        match item {
            Ok((_, event)) => events.push(event),
            Err(e) => failure = Some(e),
        }
    }
    (events, failure)
}

fn shell_outputs(events: &[ResultEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ResultEvent::ShellOutput { chunk, .. } => Some(chunk.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn s1_linear_dependency_orders_setup_through_teardown() {
    let document = r#"
lifecycle:
  - id: setup-1
    on: setup
    script:
      type: bash
      id: setup-1-script
      command: echo "1"
  - id: teardown-5
    on: teardown
    script:
      type: bash
      id: teardown-5-script
      command: echo "5"
jobs:
  - id: job1
    steps:
      - id: step1
        script:
          type: bash
          id: step1-script
          command: echo "3"
        lifecycle:
          - id: before-2
            on: beforeStep
            script:
              type: bash
              id: before-2-script
              command: echo "2"
          - id: after-4
            on: afterStep
            script:
              type: bash
              id: after-4-script
              command: echo "4"
"#;
    let workflow = decode_workflow(document).unwrap();
    let engine = Engine::builder(config("s1")).build(&workflow).unwrap();
    let (events, failure) = drain(engine.execute()).await;
    assert!(failure.is_none(), "unexpected failure: {failure:?}");

    let boundary_count = events
        .iter()
        .filter(|e| matches!(e, ResultEvent::StepBoundary { .. }))
        .count();
    assert_eq!(boundary_count, 5);

    let outputs = shell_outputs(&events);
    assert_eq!(outputs, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn s2_parallel_with_join_runs_join_last() {
    let document = r#"
jobs:
  - id: job1
    steps:
      - id: s1
        script: { type: bash, id: job1-script, command: echo 1 }
  - id: job2
    steps:
      - id: s2
        script: { type: bash, id: job2-script, command: echo 2 }
  - id: job3
    needs: [job1, job2]
    steps:
      - id: s3
        script: { type: bash, id: job3-script, command: echo 3 }
"#;
    let workflow = decode_workflow(document).unwrap();
    let engine = Engine::builder(config("s2")).build(&workflow).unwrap();
    let (events, failure) = drain(engine.execute()).await;
    assert!(failure.is_none(), "unexpected failure: {failure:?}");

    let outputs = shell_outputs(&events);
    let pos_1 = outputs.iter().position(|o| o == "1").unwrap();
    let pos_2 = outputs.iter().position(|o| o == "2").unwrap();
    let pos_3 = outputs.iter().position(|o| o == "3").unwrap();
    assert!(pos_3 > pos_1 && pos_3 > pos_2, "join ran before a dependency: {outputs:?}");
}

#[tokio::test]
async fn s3_faster_parallel_branch_precedes_slower_one() {
    let document = r#"
jobs:
  - id: job1
    steps:
      - id: s1
        script: { type: bash, id: job1-script, command: "sleep 1 && echo 1" }
  - id: job2
    steps:
      - id: s2
        script: { type: bash, id: job2-script, command: echo 2 }
  - id: job3
    needs: [job1, job2]
    steps:
      - id: s3
        script: { type: bash, id: job3-script, command: echo 3 }
"#;
    let workflow = decode_workflow(document).unwrap();
    let engine = Engine::builder(config("s3")).build(&workflow).unwrap();
    let (events, failure) = drain(engine.execute()).await;
    assert!(failure.is_none(), "unexpected failure: {failure:?}");

    let outputs = shell_outputs(&events);
    assert_eq!(outputs, vec!["2", "1", "3"]);
}

#[tokio::test]
async fn s4_cyclic_dependency_rejected_before_any_event() {
    let document = r#"
jobs:
  - id: a
    needs: [c]
    steps:
      - id: sa
        script: { type: bash, id: a-script, command: echo a }
  - id: b
    needs: [a]
    steps:
      - id: sb
        script: { type: bash, id: b-script, command: echo b }
  - id: c
    needs: [b]
    steps:
      - id: sc
        script: { type: bash, id: c-script, command: echo c }
"#;
    let workflow = decode_workflow(document).unwrap();
    let result = Engine::builder(config("s4")).build(&workflow);
    match result {
        Err(stepgraph::error::WorkflowError::CyclicDependency(path)) => {
            let names: std::collections::HashSet<&str> = path.iter().map(|id| id.as_str()).collect();
            assert_eq!(names, std::collections::HashSet::from(["a", "b", "c"]));
        }
        other => panic!("expected CyclicDependency before any event, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn s5_job_level_form_rendezvous_unblocks_the_step() {
    let document = r#"
jobs:
  - id: survey
    form:
      required: [name]
    steps:
      - id: greet
        script: { type: bash, id: greet-script, command: "echo Hello World" }
"#;
    let workflow = decode_workflow(document).unwrap();
    let engine = Arc::new(Engine::builder(config("s5")).build(&workflow).unwrap());

    let mut rx = engine.execute();
    let mut rendezvous_id = None;
    let mut outputs = Vec::new();

    while let Some(item) = rx.recv().await {
        let (_, event) = item.unwrap();
        match event {
            ResultEvent::FormRequest { rendezvous_id: id, .. } => {
                assert!(id.starts_with("job_survey_"), "unexpected rendezvous id: {id}");
                rendezvous_id = Some(id.clone());
                let mut data = FormData::new();
                data.insert("name".into(), serde_json::json!("X"));
                engine.provide_form_data(&id, data).await;
            }
            ResultEvent::ShellOutput { chunk, .. } => outputs.push(chunk),
            _ => {}
        }
    }

    assert!(rendezvous_id.is_some(), "expected exactly one formRequest");
    assert!(outputs.contains(&"Hello World".to_string()));
}

#[tokio::test]
async fn s6_failure_in_one_job_surfaces_without_losing_sibling_events() {
    let document = r#"
jobs:
  - id: good
    steps:
      - id: ok-step
        script: { type: bash, id: good-script, command: "echo OK" }
  - id: bad
    steps:
      - id: bad-step
        script: { type: bash, id: bad-script, command: command_that_does_not_exist }
"#;
    let workflow = decode_workflow(document).unwrap();
    let engine = Engine::builder(config("s6")).build(&workflow).unwrap();
    let (events, failure) = drain(engine.execute()).await;

    assert!(matches!(failure, Some(stepgraph::error::WorkflowError::CommandFailed { .. })));
    let outputs = shell_outputs(&events);
    assert!(outputs.contains(&"OK".to_string()));

    let bad_step = engine.lookup("jobs.bad.steps[0]").await.unwrap();
    assert_eq!(bad_step["status"]["status"]["state"], serde_json::json!("failure"));
}

#[tokio::test(flavor = "multi_thread")]
async fn s3_runs_within_a_reasonable_wall_clock_bound() {
    let document = r#"
jobs:
  - id: job1
    steps:
      - id: s1
        script: { type: bash, id: job1-script, command: "sleep 1 && echo 1" }
"#;
    let workflow = decode_workflow(document).unwrap();
    let engine = Engine::builder(config("s3-timing")).build(&workflow).unwrap();
    let started = tokio::time::Instant::now();
    let (_, failure) = drain(engine.execute()).await;
    assert!(failure.is_none());
    assert!(started.elapsed() < Duration::from_secs(5));
}

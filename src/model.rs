//! Core data model: workflows, jobs, steps, scripts, lifecycle events and the
//! result/status types the scheduler drives through them.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(JobId);
id_newtype!(StepId);
id_newtype!(ScriptId);
id_newtype!(LifecycleEventId);

/// Reserved job identifiers for the synthetic DAG endpoints. Never present in
/// a decoded document; assigned by the DAG builder.
pub const ROOT_JOB_ID: &str = "root";
pub const TAIL_JOB_ID: &str = "tail";

/// Declared permission tags. Stored and surfaced, never enforced by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Permission {
    ReadFile,
    WriteFile,
    RunCommand,
    RunScript,
    DeleteFile,
    ReadDirectory,
    WriteDirectory,
    DeleteDirectory,
    ReadEnvironmentVariable,
    WriteEnvironmentVariable,
    ReadSecret,
    WriteSecret,
    ReadVariable,
    WriteVariable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Directory template scripts resolve bare file references against when
    /// no repository source is configured for the run.
    #[serde(default)]
    pub template_path: Option<String>,
}

/// One of the phases a lifecycle event can bind to, in their total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecyclePhase {
    Setup,
    BeforeJob,
    BeforeStep,
    AfterStep,
    AfterJob,
    Teardown,
}

/// A `{file, output}` pair used by template scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFile {
    pub file: String,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Bash,
    Template,
    Javascript,
}

/// The executable unit a step or lifecycle event carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Script {
    Bash {
        id: ScriptId,
        command: String,
    },
    Template {
        id: ScriptId,
        files: Vec<TemplateFile>,
    },
    Javascript {
        id: ScriptId,
        file: String,
    },
}

impl Script {
    pub fn id(&self) -> &ScriptId {
        match self {
            Script::Bash { id, .. } => id,
            Script::Template { id, .. } => id,
            Script::Javascript { id, .. } => id,
        }
    }

    pub fn kind(&self) -> ScriptKind {
        match self {
            Script::Bash { .. } => ScriptKind::Bash,
            Script::Template { .. } => ScriptKind::Template,
            Script::Javascript { .. } => ScriptKind::Javascript,
        }
    }

    /// Clone this script under a new identifier, used by the step expander
    /// when promoting a lifecycle event's script so the aggregator can route
    /// its results back to that lifecycle slot unambiguously.
    pub fn cloned_with_id(&self, new_id: ScriptId) -> Script {
        match self {
            Script::Bash { command, .. } => Script::Bash {
                id: new_id,
                command: command.clone(),
            },
            Script::Template { files, .. } => Script::Template {
                id: new_id,
                files: files.clone(),
            },
            Script::Javascript { file, .. } => Script::Javascript {
                id: new_id,
                file: file.clone(),
            },
        }
    }
}

/// A JSON-schema-shaped form request. Kept opaque (serde_json::Value) since
/// the core never validates or renders forms itself, only forwards them.
pub type FormSchema = serde_json::Value;
pub type FormData = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Reused as the cloned script's own id once the expander promotes this
    /// event into a node's script sequence, so the aggregator can route its
    /// results back here unambiguously.
    pub id: LifecycleEventId,
    /// The phase this event binds to, fixing its position in the total order.
    pub on: LifecyclePhase,
    /// The script this event runs when its phase is reached.
    pub script: Script,
    /// Results received so far for this event's (possibly cloned) script id.
    #[serde(skip)]
    pub results: Vec<ResultEvent>,
    /// Stored running status; lifecycle events are not derived like jobs are.
    #[serde(skip)]
    pub status: RunningStatus,
}

impl LifecycleEvent {
    pub fn new(id: LifecycleEventId, on: LifecyclePhase, script: Script) -> Self {
        Self {
            id,
            on,
            script,
            results: Vec::new(),
            status: RunningStatus::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Identifier, unique within its owning job.
    pub id: StepId,
    /// Human-readable label, purely for display.
    #[serde(default)]
    pub name: Option<String>,
    /// Form schema requested before this step's main script runs, if any.
    #[serde(default)]
    pub form: Option<FormSchema>,
    /// Condition expression, stored verbatim. Never evaluated by the core.
    #[serde(rename = "if", default)]
    pub condition: Option<String>,
    /// The step's own main script.
    pub script: Script,
    /// `beforeStep`/`afterStep` events bound to this step.
    #[serde(default)]
    pub lifecycle: Vec<LifecycleEvent>,
    /// Results received so far for this step's main script id.
    #[serde(skip)]
    pub results: Vec<ResultEvent>,
    /// Stored running status; steps are not derived like jobs are.
    #[serde(skip)]
    pub status: RunningStatus,
}

impl Step {
    pub fn lifecycle_of(&self, phase: LifecyclePhase) -> impl Iterator<Item = &LifecycleEvent> {
        self.lifecycle.iter().filter(move |l| l.on == phase)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    /// Identifier, unique within the workflow. Generated if the document
    /// omits it.
    pub id: JobId,
    /// Human-readable label, purely for display.
    #[serde(default)]
    pub name: Option<String>,
    /// This job's steps, run in declaration order by the expander.
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Job ids that must complete before this job becomes ready. Empty means
    /// the job is ready as soon as the synthetic root node completes.
    #[serde(default)]
    pub needs: Vec<JobId>,
    /// Environment merged over the engine's own environment for every script
    /// this job runs.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// `beforeJob`/`afterJob` events bound to this job.
    #[serde(default)]
    pub lifecycle: Vec<LifecycleEvent>,
    /// Form schema requested once, before this job's first script runs.
    #[serde(default)]
    pub form: Option<FormSchema>,
    /// Data accepted for `form`, addressable via `jobs.<id>.formData`.
    #[serde(skip)]
    pub form_data: FormData,
}

impl Job {
    pub fn lifecycle_of(&self, phase: LifecyclePhase) -> impl Iterator<Item = &LifecycleEvent> {
        self.lifecycle.iter().filter(move |l| l.on == phase)
    }

    pub fn is_empty_of_work(&self) -> bool {
        self.steps.is_empty() && self.lifecycle.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow-wide settings such as the default template search path.
    #[serde(default)]
    pub global_config: GlobalConfig,
    /// Declared permission tags. Stored and surfaced, never enforced here.
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Workflow-level events. Only `setup`/`teardown` are meaningful here;
    /// the DAG builder promotes them onto the synthetic root/tail nodes.
    #[serde(default)]
    pub lifecycle: Vec<LifecycleEvent>,
    /// Base environment merged under every job's own environment.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// The job graph, in declaration order.
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// One emission of the engine's outer event sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ResultEvent {
    ShellOutput {
        script_id: ScriptId,
        chunk: String,
    },
    TemplateProgress {
        script_id: ScriptId,
        output_path: String,
        completed: usize,
        total: usize,
    },
    StepBoundary {
        script_id: ScriptId,
    },
    FormRequest {
        script_id: ScriptId,
        rendezvous_id: String,
        schema: FormSchema,
    },
}

impl ResultEvent {
    pub fn script_id(&self) -> &ScriptId {
        match self {
            ResultEvent::ShellOutput { script_id, .. } => script_id,
            ResultEvent::TemplateProgress { script_id, .. } => script_id,
            ResultEvent::StepBoundary { script_id } => script_id,
            ResultEvent::FormRequest { script_id, .. } => script_id,
        }
    }

    pub fn completion_fraction(&self) -> Option<f64> {
        match self {
            ResultEvent::TemplateProgress {
                completed, total, ..
            } if *total > 0 => Some(*completed as f64 / *total as f64),
            _ => None,
        }
    }
}

/// The lifecycle state exposed by every step, lifecycle event, job and the
/// workflow itself. Step/lifecycle status is stored; job/workflow status is
/// always derived on demand (see `status::job_status`/`workflow_status`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum Status {
    NotStarted,
    Running { percentage: Option<f64> },
    Success { finished_at: DateTime<Utc> },
    Failure { finished_at: DateTime<Utc> },
    Skipped,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningStatus {
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for RunningStatus {
    fn default() -> Self {
        Self {
            status: Status::NotStarted,
            started_at: None,
            updated_at: None,
        }
    }
}

impl RunningStatus {
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = Status::Running { percentage: None };
        self.started_at.get_or_insert(now);
        self.updated_at = Some(now);
    }

    pub fn progress(&mut self, percentage: Option<f64>, now: DateTime<Utc>) {
        self.status = Status::Running { percentage };
        self.started_at.get_or_insert(now);
        self.updated_at = Some(now);
    }

    pub fn succeed(&mut self, now: DateTime<Utc>) {
        self.status = Status::Success { finished_at: now };
        self.updated_at = Some(now);
    }

    pub fn fail(&mut self, now: DateTime<Utc>) {
        self.status = Status::Failure { finished_at: now };
        self.updated_at = Some(now);
    }
}

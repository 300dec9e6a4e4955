//! Status Calculator: derives a job's status from its steps and job-scoped
//! lifecycle events, and the workflow's status from its jobs, following the
//! precedence rules in order. Step/lifecycle status is stored (in
//! `RunningStatus`); job/workflow status is always recomputed here, never
//! stored.

use chrono::{DateTime, Utc};

use crate::model::{Job, RunningStatus, Status};

/// The result of aggregating a job's or workflow's parts: a derived status
/// plus the min/max timestamps across those parts.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedStatus {
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DerivedStatus {
    fn not_started() -> Self {
        Self {
            status: Status::NotStarted,
            started_at: None,
            updated_at: None,
        }
    }
}

pub trait StatusParts {
    fn status(&self) -> &Status;
    fn started_at(&self) -> Option<DateTime<Utc>>;
    fn updated_at(&self) -> Option<DateTime<Utc>>;
}

impl StatusParts for RunningStatus {
    fn status(&self) -> &Status {
        &self.status
    }
    fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl StatusParts for DerivedStatus {
    fn status(&self) -> &Status {
        &self.status
    }
    fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

fn min_started<T: StatusParts>(parts: &[&T]) -> Option<DateTime<Utc>> {
    parts.iter().filter_map(|p| p.started_at()).min()
}

fn max_updated<T: StatusParts>(parts: &[&T]) -> Option<DateTime<Utc>> {
    parts.iter().filter_map(|p| p.updated_at()).max()
}

/// Apply the precedence rules to an arbitrary collection of parts. An empty
/// collection (rule 7 / "empty workflow") is always `notStarted`.
pub fn aggregate<'a, T: StatusParts + 'a>(parts: impl IntoIterator<Item = &'a T>) -> DerivedStatus {
    let parts: Vec<&T> = parts.into_iter().collect();
    if parts.is_empty() {
        return DerivedStatus::not_started();
    }

    let started_at = min_started(&parts);
    let updated_at = max_updated(&parts);

    if parts.iter().any(|p| matches!(p.status(), Status::Running { .. })) {
        let percentages: Vec<f64> = parts
            .iter()
            .filter_map(|p| match p.status() {
                Status::Running { percentage: Some(pct) } => Some(*pct),
                _ => None,
            })
            .collect();
        let percentage = if percentages.is_empty() {
            None
        } else {
            Some(percentages.iter().sum::<f64>() / percentages.len() as f64)
        };
        return DerivedStatus {
            status: Status::Running { percentage },
            started_at,
            updated_at,
        };
    }

    let failure_timestamps: Vec<DateTime<Utc>> = parts
        .iter()
        .filter_map(|p| match p.status() {
            Status::Failure { finished_at } => Some(*finished_at),
            _ => None,
        })
        .collect();
    if let Some(max_failure) = failure_timestamps.into_iter().max() {
        return DerivedStatus {
            status: Status::Failure { finished_at: max_failure },
            started_at,
            updated_at: updated_at.map(|u| u.max(max_failure)).or(Some(max_failure)),
        };
    }

    if parts.iter().all(|p| matches!(p.status(), Status::Success { .. })) {
        let max_success = parts
            .iter()
            .filter_map(|p| match p.status() {
                Status::Success { finished_at } => Some(*finished_at),
                _ => None,
            })
            .max()
            .expect("non-empty all-success set has a max timestamp");
        return DerivedStatus {
            status: Status::Success { finished_at: max_success },
            started_at,
            updated_at: updated_at.map(|u| u.max(max_success)).or(Some(max_success)),
        };
    }

    if parts.iter().all(|p| matches!(p.status(), Status::Skipped)) {
        return DerivedStatus {
            status: Status::Skipped,
            started_at,
            updated_at,
        };
    }

    if parts
        .iter()
        .all(|p| matches!(p.status(), Status::NotStarted | Status::Skipped))
    {
        return DerivedStatus {
            status: Status::NotStarted,
            started_at,
            updated_at,
        };
    }

    DerivedStatus {
        status: Status::Unknown,
        started_at,
        updated_at,
    }
}

/// A job's status is derived from the multiset of its steps' and job-scoped
/// lifecycle events' statuses (rule 7: a job with neither is `notStarted`).
pub fn job_status(job: &Job) -> DerivedStatus {
    if job.is_empty_of_work() {
        return DerivedStatus::not_started();
    }
    let step_statuses = job.steps.iter().map(|s| &s.status);
    let lifecycle_statuses = job.lifecycle.iter().map(|l| &l.status);
    aggregate(step_statuses.chain(lifecycle_statuses))
}

/// The workflow's status is derived from the multiset of its jobs' derived
/// statuses (excluding the synthetic root/tail nodes, whose steps surface as
/// `setup`/`teardown` lifecycle events rather than jobs).
pub fn workflow_status(job_statuses: &[DerivedStatus]) -> DerivedStatus {
    aggregate(job_statuses)
}

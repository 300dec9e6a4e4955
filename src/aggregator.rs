//! Result Aggregator: routes each event emitted by the scheduler back to the
//! step/lifecycle slot that owns its `scriptId`, appends it to that slot's
//! result log, and updates its running status per the transition table.

use chrono::Utc;

use crate::model::{Job, LifecycleEvent, ResultEvent, ScriptId, Status};

/// Apply the §4.7 transition table for one received event.
fn apply_transition(slot_status: &mut crate::model::RunningStatus, event: &ResultEvent) {
    let now = Utc::now();
    match event {
        ResultEvent::ShellOutput { .. } => slot_status.progress(None, now),
        ResultEvent::TemplateProgress { .. } => {
            slot_status.progress(event.completion_fraction(), now)
        }
        ResultEvent::StepBoundary { .. } => slot_status.succeed(now),
        ResultEvent::FormRequest { .. } => slot_status.progress(None, now),
    }
}

fn route_into_lifecycle(events: &mut [LifecycleEvent], script_id: &ScriptId, event: &ResultEvent) -> bool {
    for lifecycle in events.iter_mut() {
        if lifecycle.id.as_str() == script_id.as_str() {
            lifecycle.results.push(event.clone());
            apply_transition(&mut lifecycle.status, event);
            return true;
        }
    }
    false
}

/// Route `event` into the owning slot of `job`. Search order: job-scoped
/// lifecycle events, each step's own script, each step's step-scoped
/// lifecycle events. Returns `false` if no slot claimed the event (the
/// event's script id belongs to a different node).
pub fn aggregate_event(job: &mut Job, event: &ResultEvent) -> bool {
    let script_id = event.script_id().clone();

    if route_into_lifecycle(&mut job.lifecycle, &script_id, event) {
        return true;
    }

    for step in job.steps.iter_mut() {
        if step.script.id().as_str() == script_id.as_str() {
            step.results.push(event.clone());
            apply_transition(&mut step.status, event);
            return true;
        }
        if route_into_lifecycle(&mut step.lifecycle, &script_id, event) {
            return true;
        }
    }

    false
}

/// Mark the slot owning `script_id` as `failure`, used when a script
/// executor's sequence terminates with an error instead of a final
/// `stepBoundary`.
pub fn mark_failure(job: &mut Job, script_id: &ScriptId) -> bool {
    let now = Utc::now();

    for lifecycle in job.lifecycle.iter_mut() {
        if lifecycle.id.as_str() == script_id.as_str() {
            lifecycle.status.fail(now);
            return true;
        }
    }
    for step in job.steps.iter_mut() {
        if step.script.id().as_str() == script_id.as_str() {
            step.status.fail(now);
            return true;
        }
        for lifecycle in step.lifecycle.iter_mut() {
            if lifecycle.id.as_str() == script_id.as_str() {
                lifecycle.status.fail(now);
                return true;
            }
        }
    }
    false
}

//! Sequential batch execution with continue-on-error semantics.

use super::process::{Invocation, ProcessRunner};
use crate::model::{BatchOutcome, RunOutcome, Task, WorkflowEvent};
use tokio::sync::mpsc::UnboundedSender;

const RULE: &str = "============================================================";

impl Task {
    fn invocation(&self) -> Invocation {
        Invocation::new(&self.executable)
            .arg(&self.input)
            .arg(&self.output)
            .args(&self.extra_args)
            .expect_output(&self.output)
    }
}

/// Run every task in order. A failed task is counted and reported, never fatal.
pub async fn run_all(tasks: &[Task], event_tx: &UnboundedSender<WorkflowEvent>) -> BatchOutcome {
    let runner = ProcessRunner::new(event_tx);
    let total = tasks.len();
    let mut outcome = BatchOutcome::new(total);

    for (idx, task) in tasks.iter().enumerate() {
        let _ = event_tx.send(WorkflowEvent::line(RULE));
        let _ = event_tx.send(WorkflowEvent::line(format!(
            "[{}/{}] Processing: {}",
            idx + 1,
            total,
            task.input.display()
        )));
        let _ = event_tx.send(WorkflowEvent::line(RULE));

        match runner.run(&task.invocation()).await {
            Ok(()) => {
                outcome.record(true);
                let _ = event_tx.send(WorkflowEvent::line("✓ Succeeded"));
            }
            Err(e) => {
                outcome.record(false);
                tracing::warn!(input = %task.input.display(), error = %e, "batch task failed");
                let _ = event_tx.send(WorkflowEvent::line(format!("✗ Failed: {e}")));
            }
        }
    }

    let _ = event_tx.send(WorkflowEvent::line(RULE));
    let _ = event_tx.send(WorkflowEvent::line("Batch processing finished:"));
    let _ = event_tx.send(WorkflowEvent::line(format!("  Total:     {}", outcome.total)));
    let _ = event_tx.send(WorkflowEvent::line(format!("  Succeeded: {}", outcome.succeeded)));
    let _ = event_tx.send(WorkflowEvent::line(format!("  Failed:    {}", outcome.failed)));
    let _ = event_tx.send(WorkflowEvent::line(RULE));

    outcome
}

/// Batch completion is never a failure, whatever the per-task tally.
pub fn summarize(outcome: &BatchOutcome) -> RunOutcome {
    RunOutcome::success(format!(
        "Batch processing finished. Succeeded: {} / Failed: {}",
        outcome.succeeded, outcome.failed
    ))
}

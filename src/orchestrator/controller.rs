//! Operation lifecycle controller.
//!
//! Owns the single in-flight operation and forwards its events to the caller.

use crate::config::Config;
use crate::engine::{EngineReport, WorkflowEngine};
use crate::error::{Result, WorkflowError};
use crate::model::{Operation, RunOutcome, WorkflowEvent};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Clears the busy flag when the worker finishes, even if it panics.
struct ActiveSlot(Arc<AtomicBool>);

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Caller-side handle for a running operation.
pub struct OperationHandle {
    /// Progress in emission order, ending with `WorkflowEvent::Completed`.
    pub events: UnboundedReceiver<WorkflowEvent>,
    handle: tokio::task::JoinHandle<EngineReport>,
}

impl OperationHandle {
    /// Wait for the worker and return its report.
    pub async fn wait(self) -> anyhow::Result<EngineReport> {
        Ok(self.handle.await?)
    }
}

/// Runs at most one operation at a time. Submissions while busy are rejected.
pub struct TaskManager {
    cfg: Arc<Config>,
    active: Arc<AtomicBool>,
}

impl TaskManager {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self {
            cfg,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<ActiveSlot> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WorkflowError::Busy)?;
        Ok(ActiveSlot(self.active.clone()))
    }

    /// Validate `op` and start it on a dedicated worker task.
    pub fn submit(&self, op: Operation) -> Result<OperationHandle> {
        op.validate()?;
        let slot = self.acquire()?;

        let (event_tx, events) = mpsc::unbounded_channel::<WorkflowEvent>();
        let engine = WorkflowEngine::new(self.cfg.clone());
        let work = engine.run(op, event_tx.clone());
        let handle = supervise(slot, event_tx, work);

        Ok(OperationHandle { events, handle })
    }
}

/// Run `work` on its own task and always finish with one `Completed` event,
/// even when the worker panics.
fn supervise<F>(
    slot: ActiveSlot,
    event_tx: UnboundedSender<WorkflowEvent>,
    work: F,
) -> tokio::task::JoinHandle<EngineReport>
where
    F: Future<Output = EngineReport> + Send + 'static,
{
    tokio::spawn(async move {
        let report = match tokio::spawn(work).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "operation worker aborted");
                EngineReport::from(RunOutcome::failure(format!("Operation aborted: {e}")))
            }
        };
        // Free the slot first so a caller reacting to completion can submit again.
        drop(slot);
        let _ = event_tx.send(WorkflowEvent::Completed {
            outcome: report.outcome.clone(),
        });
        report
    })
}

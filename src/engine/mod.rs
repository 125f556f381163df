mod artifact;
mod batch;
mod divide;
mod pipeline;
mod process;

pub use artifact::ConfigArtifactWriter;
pub use batch::run_all;
pub use pipeline::{EnhanceTally, PipelineOrchestrator};
pub use process::{size_mb, Invocation, ProcessRunner};

use crate::config::Config;
use crate::model::{
    BatchOutcome, ConvertRequest, EnhanceRequest, Operation, RunOutcome, WorkflowEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of one engine run, with the batch tally when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReport {
    pub outcome: RunOutcome,
    pub batch: Option<BatchOutcome>,
}

impl From<RunOutcome> for EngineReport {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            batch: None,
        }
    }
}

pub struct WorkflowEngine {
    cfg: Arc<Config>,
}

impl WorkflowEngine {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self { cfg }
    }

    /// Execute one operation to completion. Every failure ends up in the outcome.
    pub async fn run(
        self,
        op: Operation,
        event_tx: mpsc::UnboundedSender<WorkflowEvent>,
    ) -> EngineReport {
        tracing::info!(operation = op.name(), "operation started");
        let tools = &self.cfg.tools;
        let writer = ConfigArtifactWriter::new(self.cfg.artifact_dir());

        let report: EngineReport = match &op {
            Operation::Convert(req) => self.convert(req, &event_tx).await.into(),
            Operation::Enhance(req) => self.enhance(req, &event_tx).await.into(),
            Operation::Divide(req) => {
                divide::divide(req, &tools.divider, &writer, &event_tx)
                    .await
                    .into()
            }
            Operation::Batch { tasks } => {
                let tally = batch::run_all(tasks, &event_tx).await;
                EngineReport {
                    outcome: batch::summarize(&tally),
                    batch: Some(tally),
                }
            }
            Operation::Pipeline(req) => PipelineOrchestrator::new(tools, &writer, &event_tx)
                .run(req)
                .await
                .into(),
        };

        tracing::info!(
            operation = op.name(),
            succeeded = report.outcome.succeeded,
            "operation finished"
        );
        report
    }

    async fn convert(
        &self,
        req: &ConvertRequest,
        event_tx: &mpsc::UnboundedSender<WorkflowEvent>,
    ) -> RunOutcome {
        let inv = Invocation::new(self.cfg.tools.converter(req.kind))
            .arg(&req.input)
            .arg(&req.output)
            .expect_output(&req.output);
        let _ = event_tx.send(WorkflowEvent::line("Starting conversion..."));
        match ProcessRunner::new(event_tx).run(&inv).await {
            Ok(()) => {
                let size = process::size_mb(&req.output).unwrap_or(0.0);
                RunOutcome::success(format!(
                    "Conversion succeeded! Output file: {} ({size:.2} MB)",
                    req.output.display()
                ))
            }
            Err(e) => RunOutcome::failure(format!("Conversion failed: {e}")),
        }
    }

    async fn enhance(
        &self,
        req: &EnhanceRequest,
        event_tx: &mpsc::UnboundedSender<WorkflowEvent>,
    ) -> RunOutcome {
        let inv = Invocation::new(&self.cfg.tools.enhancer)
            .arg(&req.input)
            .arg(&req.output)
            .expect_output(&req.output);
        let _ = event_tx.send(WorkflowEvent::line("Starting enhancement..."));
        match ProcessRunner::new(event_tx).run(&inv).await {
            Ok(()) => RunOutcome::success(format!(
                "Enhancement succeeded! Output file: {}",
                req.output.display()
            )),
            Err(e) => RunOutcome::failure(format!("Enhancement failed: {e}")),
        }
    }
}


#[cfg(all(test, unix))]
mod tests {
    use super::test_support::{fake_converter, fake_tool};
    use super::*;
    use crate::model::{ConversionKind, Task, TaskKind};

    fn engine_with(dir: &std::path::Path) -> WorkflowEngine {
        let mut cfg = Config::default();
        cfg.tools.rgb_converter = fake_converter(dir, "las2pcd");
        cfg.tools.intensity_converter = fake_tool(dir, "las2pcd_intensity", "exit 0\n");
        cfg.tools.enhancer = fake_converter(dir, "pcd_enhancer");
        cfg.artifact_dir = Some(dir.join("artifacts"));
        WorkflowEngine::new(Arc::new(cfg))
    }

    #[tokio::test]
    async fn convert_reports_output_size() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.las");
        std::fs::write(&input, vec![0u8; 2048]).unwrap();
        let output = dir.path().join("scan.pcd");
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = engine_with(dir.path())
            .run(
                Operation::Convert(ConvertRequest {
                    input,
                    output: output.clone(),
                    kind: ConversionKind::Rgb,
                }),
                tx,
            )
            .await;
        assert!(report.outcome.succeeded, "{}", report.outcome.message);
        assert!(report.outcome.message.contains("MB)"));
        assert!(report.batch.is_none());
        assert!(output.exists());
    }

    #[tokio::test]
    async fn convert_without_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.las");
        std::fs::write(&input, b"las").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = engine_with(dir.path())
            .run(
                Operation::Convert(ConvertRequest {
                    input,
                    output: dir.path().join("scan.pcd"),
                    kind: ConversionKind::Intensity,
                }),
                tx,
            )
            .await;
        assert!(!report.outcome.succeeded);
        assert!(report.outcome.message.contains("no output produced"));
    }

    #[tokio::test]
    async fn batch_report_carries_tally() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path());
        let input = dir.path().join("tile.pcd");
        std::fs::write(&input, b"pcd").unwrap();
        let tasks = vec![
            Task::new(
                TaskKind::Enhance,
                input.clone(),
                dir.path().join("tile_out.pcd"),
                engine.cfg.tools.enhancer.clone(),
            ),
            Task::new(
                TaskKind::Enhance,
                dir.path().join("missing.pcd"),
                dir.path().join("missing_out.pcd"),
                engine.cfg.tools.enhancer.clone(),
            ),
        ];
        let (tx, _rx) = mpsc::unbounded_channel();

        let report = engine.run(Operation::Batch { tasks }, tx).await;
        assert!(report.outcome.succeeded);
        assert_eq!(
            report.batch,
            Some(BatchOutcome {
                total: 2,
                succeeded: 1,
                failed: 1
            })
        );
    }
}

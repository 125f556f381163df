//! Guided convert -> divide -> (enhance) pipeline.
//!
//! CONVERT and DIVIDE are gates: a failure in either ends the run with a
//! failed outcome. ENHANCE is best effort per tile and only shows up as a
//! tally in the final message.

use super::artifact::ConfigArtifactWriter;
use super::divide::{describe_leaf, inspect_products, run_divider};
use super::process::{Invocation, ProcessRunner};
use crate::config::ToolPaths;
use crate::model::{DivideConfig, PipelineRequest, RunOutcome, Stage, WorkflowEvent};
use crate::naming::{self, PIPELINE_PREFIX};
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;

const STAGE_COUNT: usize = 3;

/// Per-tile enhancement tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnhanceTally {
    pub succeeded: usize,
    pub total: usize,
}

pub struct PipelineOrchestrator<'a> {
    tools: &'a ToolPaths,
    writer: &'a ConfigArtifactWriter,
    event_tx: &'a UnboundedSender<WorkflowEvent>,
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(
        tools: &'a ToolPaths,
        writer: &'a ConfigArtifactWriter,
        event_tx: &'a UnboundedSender<WorkflowEvent>,
    ) -> Self {
        Self {
            tools,
            writer,
            event_tx,
        }
    }

    fn emit(&self, msg: impl Into<String>) {
        let _ = self.event_tx.send(WorkflowEvent::line(msg));
    }

    fn banner(&self, stage: Stage, index: usize) {
        tracing::info!(stage = stage.label(), "pipeline stage started");
        let _ = self.event_tx.send(WorkflowEvent::StageStarted {
            stage,
            index,
            total: STAGE_COUNT,
        });
    }

    pub async fn run(&self, req: &PipelineRequest) -> RunOutcome {
        let out_dir = &req.output_dir;
        let out_dir_display = naming::with_trailing_separator(out_dir)
            .to_string_lossy()
            .into_owned();
        if let Err(e) = std::fs::create_dir_all(out_dir) {
            return RunOutcome::failure(format!(
                "Cannot create output directory {out_dir_display}: {e}"
            ));
        }
        let runner = ProcessRunner::new(self.event_tx);

        // CONVERT
        self.banner(Stage::Convert, 1);
        let temp_pcd = naming::pipeline_temp(&req.input, out_dir);
        let convert = Invocation::new(self.tools.converter(req.kind))
            .arg(&req.input)
            .arg(&temp_pcd)
            .expect_output(&temp_pcd);
        if let Err(e) = runner.run(&convert).await {
            return RunOutcome::failure(format!("LAS to PCD conversion failed: {e}"));
        }
        self.emit("✓ LAS to PCD conversion finished");

        // DIVIDE
        self.banner(Stage::Divide, 2);
        let cfg = DivideConfig {
            grid_size_x: req.grid_size,
            grid_size_y: req.grid_size,
            leaf_size: req.leaf_size,
            merge_outputs: false,
        };
        self.emit(format!("Grid size: {}m x {}m", req.grid_size, req.grid_size));
        self.emit(format!("Downsampling: {}", describe_leaf(req.leaf_size)));
        if let Err(e) = run_divider(
            &runner,
            self.writer,
            &self.tools.divider,
            std::slice::from_ref(&temp_pcd),
            out_dir,
            PIPELINE_PREFIX,
            &cfg,
        )
        .await
        {
            // The intermediate file stays for inspection.
            return RunOutcome::failure(format!("Point cloud division failed: {e}"));
        }
        self.emit("✓ Point cloud division finished");
        match std::fs::remove_file(&temp_pcd) {
            Ok(()) => self.emit("✓ Removed intermediate file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %temp_pcd.display(), error = %e, "could not remove intermediate file");
                self.emit(format!(
                    "Could not remove intermediate file {}: {e}",
                    temp_pcd.display()
                ));
            }
        }

        // ENHANCE
        let tally = if req.enhance {
            self.banner(Stage::Enhance, 3);
            Some(self.enhance_tiles(&runner, out_dir).await)
        } else {
            let _ = self.event_tx.send(WorkflowEvent::StageSkipped {
                stage: Stage::Enhance,
                index: 3,
                total: STAGE_COUNT,
            });
            None
        };

        // DONE
        let products = match inspect_products(out_dir, PIPELINE_PREFIX) {
            Ok(p) => p,
            Err(e) => {
                return RunOutcome::failure(format!(
                    "Pipeline finished but outputs unreadable: {e}"
                ))
            }
        };
        let metadata_name = naming::metadata_file_name(PIPELINE_PREFIX);
        self.emit("Pipeline complete!");
        self.emit(format!("Output directory: {out_dir_display}"));
        self.emit(format!("Generated {} PCD file(s)", products.tiles));
        if products.metadata_present {
            self.emit(format!("Metadata file: {metadata_name}"));
        }

        let mut msg = format!(
            "Pipeline complete.\nOutput directory: {out_dir_display}\nGenerated {} PCD file(s)\nMetadata file {}: {metadata_name}",
            products.tiles,
            if products.metadata_present { "present" } else { "missing" },
        );
        if let Some(t) = tally {
            msg.push_str(&format!(
                "\nEnhancement: {}/{} file(s) succeeded",
                t.succeeded, t.total
            ));
        }
        RunOutcome::success(msg)
    }

    async fn enhance_tiles(&self, runner: &ProcessRunner<'_>, out_dir: &Path) -> EnhanceTally {
        let tiles = match naming::list_tiles(out_dir, PIPELINE_PREFIX) {
            Ok(t) => t,
            Err(e) => {
                self.emit(format!("Cannot list divided files: {e}"));
                return EnhanceTally::default();
            }
        };
        let total = tiles.len();
        self.emit(format!("Found {total} PCD file(s) to enhance"));

        let mut tally = EnhanceTally {
            succeeded: 0,
            total,
        };
        for (idx, tile) in tiles.iter().enumerate() {
            let name = tile
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let enhanced = naming::enhanced_sibling(tile);
            let inv = Invocation::new(&self.tools.enhancer)
                .arg(tile)
                .arg(&enhanced)
                .expect_output(&enhanced);

            let res = match runner.run(&inv).await {
                Ok(()) => std::fs::rename(&enhanced, tile).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match res {
                Ok(()) => {
                    tally.succeeded += 1;
                    self.emit(format!("[{}/{total}] ✓ {name}", idx + 1));
                }
                Err(e) => {
                    // A half-written sibling would be counted as a tile later.
                    let _ = std::fs::remove_file(&enhanced);
                    tracing::warn!(tile = %name, error = %e, "tile enhancement failed");
                    self.emit(format!("[{}/{total}] ✗ {name} - {e}", idx + 1));
                }
            }
        }
        self.emit(format!(
            "✓ Enhancement finished: {}/{} succeeded",
            tally.succeeded, tally.total
        ));
        tally
    }
}

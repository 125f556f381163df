//! Grid division through the external divider.

use super::artifact::ConfigArtifactWriter;
use super::process::{Invocation, ProcessRunner};
use crate::error::Result;
use crate::model::{DivideConfig, DivideRequest, RunOutcome, WorkflowEvent};
use crate::naming;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

/// `divider <N> <in_1>..<in_N> <outDir/> <prefix> <config>`
pub fn divider_invocation(
    divider: &Path,
    inputs: &[PathBuf],
    output_dir: &Path,
    prefix: &str,
    config_path: &Path,
) -> Invocation {
    Invocation::new(divider)
        .arg(inputs.len().to_string())
        .args(inputs)
        .arg(naming::with_trailing_separator(output_dir))
        .arg(prefix)
        .arg(config_path)
}

pub fn describe_leaf(leaf_size: f64) -> String {
    if leaf_size > 0.0 {
        format!("yes ({leaf_size}m)")
    } else {
        "no".to_string()
    }
}

/// What the divider left in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivideProducts {
    pub tiles: usize,
    pub metadata_present: bool,
}

pub fn inspect_products(output_dir: &Path, prefix: &str) -> Result<DivideProducts> {
    let tiles = naming::list_tiles(output_dir, prefix)?.len();
    let metadata_present = output_dir
        .join(naming::metadata_file_name(prefix))
        .is_file();
    Ok(DivideProducts {
        tiles,
        metadata_present,
    })
}

/// Write the config artifact and invoke the divider once.
pub async fn run_divider(
    runner: &ProcessRunner<'_>,
    writer: &ConfigArtifactWriter,
    divider: &Path,
    inputs: &[PathBuf],
    output_dir: &Path,
    prefix: &str,
    cfg: &DivideConfig,
) -> Result<()> {
    let config_path = writer.write(cfg)?;
    let inv = divider_invocation(divider, inputs, output_dir, prefix, &config_path);
    runner.run(&inv).await
}

/// Standalone divide operation.
pub async fn divide(
    req: &DivideRequest,
    divider: &Path,
    writer: &ConfigArtifactWriter,
    event_tx: &UnboundedSender<WorkflowEvent>,
) -> RunOutcome {
    if let Err(e) = std::fs::create_dir_all(&req.output_dir) {
        return RunOutcome::failure(format!(
            "Division failed: cannot create {}: {e}",
            req.output_dir.display()
        ));
    }

    let cfg = DivideConfig {
        grid_size_x: req.grid_size_x,
        grid_size_y: req.grid_size_y,
        leaf_size: req.leaf_size,
        merge_outputs: req.merge_outputs,
    };
    let out_dir = naming::with_trailing_separator(&req.output_dir);
    for line in [
        "Configuration:".to_string(),
        format!("  Output directory: {}", out_dir.to_string_lossy()),
        format!("  File prefix: {}", req.prefix),
        format!("  Grid size: {}m x {}m", req.grid_size_x, req.grid_size_y),
        format!("  Downsampling: {}", describe_leaf(req.leaf_size)),
        format!("  Merge outputs: {}", if req.merge_outputs { "yes" } else { "no" }),
        String::new(),
        format!("Processing {} file(s)...", req.inputs.len()),
    ] {
        let _ = event_tx.send(WorkflowEvent::Line(line));
    }

    let runner = ProcessRunner::new(event_tx);
    if let Err(e) = run_divider(
        &runner,
        writer,
        divider,
        &req.inputs,
        &req.output_dir,
        &req.prefix,
        &cfg,
    )
    .await
    {
        return RunOutcome::failure(format!("Division failed: {e}"));
    }

    let products = match inspect_products(&req.output_dir, &req.prefix) {
        Ok(p) => p,
        Err(e) => return RunOutcome::failure(format!("Division finished but outputs unreadable: {e}")),
    };
    let mut msg = format!(
        "Division succeeded.\nOutput directory: {}\nGenerated {} PCD file(s)",
        out_dir.to_string_lossy(),
        products.tiles
    );
    if products.metadata_present {
        msg.push_str(&format!(
            "\nMetadata file: {}",
            naming::metadata_file_name(&req.prefix)
        ));
    }
    RunOutcome::success(msg)
}

use crate::error::{Result, WorkflowError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which converter flavour to run for LAS input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionKind {
    Rgb,
    Intensity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Convert,
    Enhance,
}

/// A single independent unit of batch work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    pub input: PathBuf,
    pub output: PathBuf,
    pub executable: PathBuf,
    /// Appended after `<input> <output>`. Nothing populates this yet.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Task {
    pub fn new(kind: TaskKind, input: PathBuf, output: PathBuf, executable: PathBuf) -> Self {
        Self {
            kind,
            input,
            output,
            executable,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub kind: ConversionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceRequest {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Standalone divide: several inputs, independent X/Y grid sizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivideRequest {
    pub inputs: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub grid_size_x: f64,
    pub grid_size_y: f64,
    pub leaf_size: f64,
    pub merge_outputs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub kind: ConversionKind,
    /// Meters, used for both X and Y.
    pub grid_size: f64,
    /// Meters; 0 disables downsampling.
    pub leaf_size: f64,
    pub enhance: bool,
}

/// Parameters handed to the division executable through the config artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DivideConfig {
    pub grid_size_x: f64,
    pub grid_size_y: f64,
    pub leaf_size: f64,
    pub merge_outputs: bool,
}

/// Top-level unit of work accepted by the task manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum Operation {
    Convert(ConvertRequest),
    Divide(DivideRequest),
    Enhance(EnhanceRequest),
    Batch { tasks: Vec<Task> },
    Pipeline(PipelineRequest),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Convert(_) => "convert",
            Operation::Divide(_) => "divide",
            Operation::Enhance(_) => "enhance",
            Operation::Batch { .. } => "batch",
            Operation::Pipeline(_) => "pipeline",
        }
    }

    /// Caller-level checks, run before any worker is started.
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::Convert(req) => {
                require_file(&req.input, "input file")?;
                require_set(&req.output, "output file")
            }
            Operation::Enhance(req) => {
                require_file(&req.input, "input file")?;
                require_set(&req.output, "output file")
            }
            Operation::Divide(req) => {
                if req.inputs.is_empty() {
                    return Err(WorkflowError::validation(
                        "at least one PCD input file is required",
                    ));
                }
                for input in &req.inputs {
                    require_file(input, "input file")?;
                }
                require_set(&req.output_dir, "output directory")?;
                if req.prefix.trim().is_empty() {
                    return Err(WorkflowError::validation("output prefix must not be empty"));
                }
                require_positive(req.grid_size_x, "grid size X")?;
                require_positive(req.grid_size_y, "grid size Y")?;
                require_non_negative(req.leaf_size, "leaf size")
            }
            Operation::Batch { tasks } => {
                if tasks.is_empty() {
                    return Err(WorkflowError::validation(
                        "batch requires at least one task",
                    ));
                }
                for task in tasks {
                    require_set(&task.input, "task input")?;
                    require_set(&task.output, "task output")?;
                    require_set(&task.executable, "task executable")?;
                }
                Ok(())
            }
            Operation::Pipeline(req) => {
                require_file(&req.input, "input file")?;
                require_set(&req.output_dir, "output directory")?;
                require_positive(req.grid_size, "grid size")?;
                require_non_negative(req.leaf_size, "leaf size")
            }
        }
    }
}

fn require_set(path: &std::path::Path, what: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(WorkflowError::validation(format!("{what} is required")));
    }
    Ok(())
}

fn require_file(path: &std::path::Path, what: &str) -> Result<()> {
    require_set(path, what)?;
    if !path.is_file() {
        return Err(WorkflowError::validation(format!(
            "{what} does not exist: {}",
            path.display()
        )));
    }
    Ok(())
}

fn require_positive(value: f64, what: &str) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(WorkflowError::validation(format!(
            "{what} must be a positive number, got {value}"
        )));
    }
    Ok(())
}

fn require_non_negative(value: f64, what: &str) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(WorkflowError::validation(format!(
            "{what} must not be negative, got {value}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Convert,
    Divide,
    Enhance,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Convert => "LAS -> PCD conversion",
            Stage::Divide => "Point cloud division",
            Stage::Enhance => "PCD enhancement",
        }
    }
}

/// Terminal result of one top-level operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub succeeded: bool,
    pub message: String,
}

impl RunOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchOutcome {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Events streamed from a running operation, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    Line(String),
    StageStarted {
        stage: Stage,
        index: usize,
        total: usize,
    },
    StageSkipped {
        stage: Stage,
        index: usize,
        total: usize,
    },
    Completed {
        outcome: RunOutcome,
    },
}

impl WorkflowEvent {
    pub fn line(msg: impl Into<String>) -> Self {
        WorkflowEvent::Line(msg.into())
    }

    /// Render a human-readable message for CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            WorkflowEvent::Line(msg) => msg.clone(),
            WorkflowEvent::StageStarted {
                stage,
                index,
                total,
            } => format!("== Stage {index}/{total}: {} ==", stage.label()),
            WorkflowEvent::StageSkipped {
                stage,
                index,
                total,
            } => format!("== Stage {index}/{total}: {} (skipped) ==", stage.label()),
            WorkflowEvent::Completed { outcome } => {
                if outcome.succeeded {
                    outcome.message.clone()
                } else {
                    format!("FAILED: {}", outcome.message)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataSource {
    /// Structured JSON query tool (pdal).
    #[serde(rename = "A")]
    Structured,
    /// Free-text report tool (lasinfo).
    #[serde(rename = "B")]
    Report,
}

impl MetadataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MetadataSource::Structured => "A",
            MetadataSource::Report => "B",
        }
    }
}

/// Descriptive header information for a point cloud file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub point_count: Option<u64>,
    pub format_version: Option<String>,
    pub bounds_min: Option<Vec3>,
    pub bounds_max: Option<Vec3>,
    pub offset: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub software: Option<String>,
    pub system: Option<String>,
    pub source: Option<MetadataSource>,
}

impl Metadata {
    /// Number of populated descriptive fields; the source tag does not count.
    pub fn field_count(&self) -> usize {
        [
            self.point_count.is_some(),
            self.format_version.is_some(),
            self.bounds_min.is_some(),
            self.bounds_max.is_some(),
            self.offset.is_some(),
            self.scale.is_some(),
            self.software.is_some(),
            self.system.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }
}

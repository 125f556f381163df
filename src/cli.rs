use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use pcmap_workflow::engine::size_mb;
use pcmap_workflow::model::{
    ConversionKind, ConvertRequest, DivideRequest, EnhanceRequest, Operation, PipelineRequest,
    Task, TaskKind, WorkflowEvent,
};
use pcmap_workflow::orchestrator::{process_run_completion, TaskManager};
use pcmap_workflow::text_summary::build_metadata_summary;
use pcmap_workflow::{naming, Config, MetadataExtractor};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "pcmap",
    version,
    about = "Drive LAS to PCD conversion, map division and enhancement tools"
)]
pub struct Cli {
    /// Configuration file (default: <config dir>/pcmap/config.yaml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Print a JSON report instead of progress text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Rgb,
    Intensity,
}

impl From<KindArg> for ConversionKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Rgb => ConversionKind::Rgb,
            KindArg::Intensity => ConversionKind::Intensity,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BatchTaskArg {
    Convert,
    Enhance,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Convert one LAS file to PCD
    Convert {
        input: PathBuf,
        /// Output file (default: <input stem>.pcd next to the input)
        #[arg(short, long, conflicts_with_all = ["output_dir", "name"])]
        output: Option<PathBuf>,
        /// Directory for the output file
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Output file name; `.pcd` is appended when missing
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum, default_value = "rgb")]
        kind: KindArg,
    },

    /// Divide PCD files into grid tiles
    Divide(DivideArgs),

    /// Enhance one PCD file
    Enhance {
        input: PathBuf,
        output: PathBuf,
    },

    /// Run one tool over many files, continuing past failures
    Batch {
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(long, value_enum, default_value = "convert")]
        task: BatchTaskArg,
        /// Converter flavour for `--task convert`
        #[arg(long, value_enum, default_value = "rgb")]
        kind: KindArg,
    },

    /// Convert, divide and optionally enhance one LAS file
    Pipeline {
        input: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(long, value_enum, default_value = "rgb")]
        kind: KindArg,
        /// Grid cell size in meters (X and Y)
        #[arg(long, default_value_t = 20.0)]
        grid_size: f64,
        /// Downsampling leaf size in meters, 0 to skip
        #[arg(long, default_value_t = 0.2)]
        leaf_size: f64,
        /// Enhance every produced tile
        #[arg(long)]
        enhance: bool,
    },

    /// Show LAS header metadata
    Info { input: PathBuf },

    /// Print the resolved configuration
    ShowConfig,
}

#[derive(Debug, Args, Clone)]
pub struct DivideArgs {
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[arg(short, long)]
    output_dir: PathBuf,
    #[arg(long, default_value = naming::PIPELINE_PREFIX)]
    prefix: String,
    #[arg(long, default_value_t = 20.0)]
    grid_size_x: f64,
    #[arg(long, default_value_t = 20.0)]
    grid_size_y: f64,
    #[arg(long, default_value_t = 0.2)]
    leaf_size: f64,
    /// Merge all inputs before dividing
    #[arg(long)]
    merge: bool,
}

/// Build an `Operation` from a processing subcommand.
fn build_operation(cmd: &Command, cfg: &Config) -> Option<Operation> {
    let op = match cmd.clone() {
        Command::Convert {
            input,
            output,
            output_dir,
            name,
            kind,
        } => {
            let output = output.unwrap_or_else(|| {
                let dir = output_dir
                    .or_else(|| input.parent().map(PathBuf::from))
                    .unwrap_or_default();
                match name {
                    Some(name) => naming::named_output(&name, &dir),
                    None => naming::default_output(&input, &dir),
                }
            });
            Operation::Convert(ConvertRequest {
                input,
                output,
                kind: kind.into(),
            })
        }
        Command::Divide(a) => Operation::Divide(DivideRequest {
            inputs: a.inputs,
            output_dir: a.output_dir,
            prefix: a.prefix,
            grid_size_x: a.grid_size_x,
            grid_size_y: a.grid_size_y,
            leaf_size: a.leaf_size,
            merge_outputs: a.merge,
        }),
        Command::Enhance { input, output } => Operation::Enhance(EnhanceRequest {
            input,
            output: PathBuf::from(naming::ensure_extension(
                &output.to_string_lossy(),
                naming::PCD_EXTENSION,
            )),
        }),
        Command::Batch {
            inputs,
            output_dir,
            task,
            kind,
        } => {
            let (task_kind, executable) = match task {
                BatchTaskArg::Convert => (
                    TaskKind::Convert,
                    cfg.tools.converter(kind.into()).to_path_buf(),
                ),
                BatchTaskArg::Enhance => (TaskKind::Enhance, cfg.tools.enhancer.clone()),
            };
            let tasks = inputs
                .into_iter()
                .map(|input| {
                    let output = naming::default_output(&input, &output_dir);
                    Task::new(task_kind, input, output, executable.clone())
                })
                .collect();
            Operation::Batch { tasks }
        }
        Command::Pipeline {
            input,
            output_dir,
            kind,
            grid_size,
            leaf_size,
            enhance,
        } => Operation::Pipeline(PipelineRequest {
            input,
            output_dir,
            kind: kind.into(),
            grid_size,
            leaf_size,
            enhance,
        }),
        Command::Info { .. } | Command::ShowConfig => return None,
    };
    Some(op)
}

/// Run the CLI. Returns whether the operation succeeded.
pub async fn run(args: Cli) -> Result<bool> {
    let cfg = Config::resolve(args.config.as_deref()).context("failed to load configuration")?;

    match &args.command {
        Command::ShowConfig => {
            print!("{}", cfg.to_yaml()?);
            return Ok(true);
        }
        Command::Info { input } => return run_info(&args, &cfg, input).await,
        _ => {}
    }

    let op = build_operation(&args.command, &cfg)
        .context("subcommand does not describe an operation")?;
    run_operation(&args, Arc::new(cfg), op).await
}

async fn run_info(args: &Cli, cfg: &Config, input: &std::path::Path) -> Result<bool> {
    if !input.is_file() {
        anyhow::bail!("input file does not exist: {}", input.display());
    }
    let extractor = MetadataExtractor::from_config(cfg);

    if args.json {
        let metadata = extractor.require(input).await?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(true);
    }

    let metadata = extractor.extract(input).await;
    let summary = build_metadata_summary(
        input,
        size_mb(input),
        metadata.as_ref(),
        &cfg.tools.metadata_query,
    );
    for line in summary.lines {
        println!("{line}");
    }
    // Text mode prints the diagnostic instead of failing.
    Ok(true)
}

async fn run_operation(args: &Cli, cfg: Arc<Config>, op: Operation) -> Result<bool> {
    let name = op.name();
    let manager = TaskManager::new(cfg);
    let mut handle = manager.submit(op)?;
    let (out_tx, out_handle) = spawn_output_writer();

    while let Some(ev) = handle.events.recv().await {
        if args.json {
            continue;
        }
        match &ev {
            WorkflowEvent::StageStarted { .. } | WorkflowEvent::StageSkipped { .. } => {
                let _ = out_tx.send(OutputLine::Stdout(String::new()));
                let _ = out_tx.send(OutputLine::Stdout(ev.to_message()));
            }
            WorkflowEvent::Completed { outcome } => {
                let _ = out_tx.send(OutputLine::Stdout(String::new()));
                let line = ev.to_message();
                if outcome.succeeded {
                    let _ = out_tx.send(OutputLine::Stdout(line));
                } else {
                    let _ = out_tx.send(OutputLine::Stderr(line));
                }
            }
            WorkflowEvent::Line(_) => {
                let _ = out_tx.send(OutputLine::Stdout(ev.to_message()));
            }
        }
    }

    let report = handle.wait().await.context("operation worker failed")?;
    if args.json {
        let processed = process_run_completion(name, &report);
        let _ = out_tx.send(OutputLine::Stdout(serde_json::to_string_pretty(&processed)?));
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(report.outcome.succeeded)
}

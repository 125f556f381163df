//! Runs one external executable and streams its stdout as progress lines.

use crate::error::{Result, WorkflowError};
use crate::model::WorkflowEvent;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;

/// One external command line plus the output file it must leave behind.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub expected_output: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            expected_output: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn expect_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected_output = Some(path.into());
        self
    }

    /// Shell-ish rendering for progress output.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(|a| a.as_os_str()))
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Streams process stdout into the event channel, one event per line.
pub struct ProcessRunner<'a> {
    event_tx: &'a UnboundedSender<WorkflowEvent>,
}

impl<'a> ProcessRunner<'a> {
    pub fn new(event_tx: &'a UnboundedSender<WorkflowEvent>) -> Self {
        Self { event_tx }
    }

    /// Run to completion. No retries and no timeout.
    pub async fn run(&self, inv: &Invocation) -> Result<()> {
        let _ = self
            .event_tx
            .send(WorkflowEvent::line(format!("Executing: {}", inv.display())));
        tracing::info!(command = %inv.display(), "spawning external tool");

        let mut child = Command::new(&inv.program)
            .args(&inv.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| WorkflowError::Spawn {
                program: inv.program_name(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain stderr concurrently; a full stderr pipe would stall the child.
        let stderr_task = async move {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr {
                let _ = err.read_to_end(&mut buf).await;
            }
            String::from_utf8_lossy(&buf).into_owned()
        };

        // Lines are split on raw bytes; tools may print non-UTF-8 text.
        let event_tx = self.event_tx;
        let stdout_task = async move {
            let Some(out) = stdout else {
                return Ok::<(), std::io::Error>(());
            };
            let mut reader = BufReader::new(out);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                let _ = event_tx.send(WorkflowEvent::line(line.trim_end()));
            }
            Ok(())
        };

        let (stdout_res, stderr_text) = futures::join!(stdout_task, stderr_task);
        let status = child.wait().await?;
        if let Err(e) = stdout_res {
            tracing::warn!(error = %e, "stopped reading tool output");
        }

        if !status.success() {
            tracing::warn!(command = %inv.display(), %status, "external tool failed");
            return Err(WorkflowError::ProcessFailed {
                program: inv.program_name(),
                status,
                stderr: stderr_text.trim_end().to_string(),
            });
        }

        if let Some(expected) = &inv.expected_output {
            if !expected.exists() {
                return Err(WorkflowError::OutputMissing {
                    path: expected.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Size of a file in MiB, if it can be read.
pub fn size_mb(path: &Path) -> Option<f64> {
    std::fs::metadata(path)
        .ok()
        .map(|m| m.len() as f64 / (1024.0 * 1024.0))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::test_support::{drain_lines, fake_tool};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn streams_stdout_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "chatty", "echo one\necho two\necho three\n");
        let (tx, mut rx) = mpsc::unbounded_channel();

        ProcessRunner::new(&tx)
            .run(&Invocation::new(&tool))
            .await
            .unwrap();
        drop(tx);

        let lines = drain_lines(&mut rx);
        assert!(lines[0].starts_with("Executing: "));
        assert_eq!(&lines[1..], &["one", "two", "three"]);
    }

    #[tokio::test]
    async fn non_utf8_output_keeps_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            "latin1",
            "printf 'Fortschritt \\374ber\\n'\ni=1\nwhile [ \"$i\" -le 2000 ]; do echo \"progress $i\"; i=$((i+1)); done\ntouch \"$1\"\n",
        );
        let out = dir.path().join("out.pcd");
        let (tx, mut rx) = mpsc::unbounded_channel();

        ProcessRunner::new(&tx)
            .run(&Invocation::new(&tool).arg(&out).expect_output(&out))
            .await
            .unwrap();
        drop(tx);

        assert!(out.exists());
        let lines = drain_lines(&mut rx);
        assert_eq!(lines[1], "Fortschritt \u{FFFD}ber");
        assert_eq!(lines.len(), 2002);
        assert_eq!(lines.last().map(String::as_str), Some("progress 2000"));
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(
            dir.path(),
            "broken",
            "echo partial\necho 'cannot open input' >&2\necho 'second line' >&2\nexit 3\n",
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = ProcessRunner::new(&tx)
            .run(&Invocation::new(&tool))
            .await
            .unwrap_err();
        match err {
            WorkflowError::ProcessFailed { stderr, status, .. } => {
                assert_eq!(stderr, "cannot open input\nsecond line");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_exit_without_output_is_distinct_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "lazy", "exit 0\n");
        let out = dir.path().join("never.pcd");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = ProcessRunner::new(&tx)
            .run(&Invocation::new(&tool).expect_output(&out))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::OutputMissing { ref path } if path == &out));
    }

    #[tokio::test]
    async fn expected_output_present_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "copy", "cp \"$1\" \"$2\"\n");
        let input = dir.path().join("in.las");
        let output = dir.path().join("out.pcd");
        std::fs::write(&input, b"points").unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();

        ProcessRunner::new(&tx)
            .run(
                &Invocation::new(&tool)
                    .arg(&input)
                    .arg(&output)
                    .expect_output(&output),
            )
            .await
            .unwrap();
        assert!(output.exists());
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = ProcessRunner::new(&tx)
            .run(&Invocation::new("/no/such/tool-pcmap"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Spawn { .. }));
        assert!(err.is_process_error());
    }
}

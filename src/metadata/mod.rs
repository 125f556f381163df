//! Point cloud header metadata via external tools.
//!
//! Backend A (structured JSON query) is tried first, backend B (text report)
//! second. The first backend that yields at least one field wins outright;
//! fields are never combined across backends.

mod report;
mod structured;

use crate::config::Config;
use crate::error::WorkflowError;
use crate::model::{Metadata, MetadataSource};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Why a backend produced nothing.
#[derive(Debug, PartialEq, Eq)]
pub enum BackendFailure {
    Spawn(String),
    Exit(Option<i32>),
    Timeout(Duration),
    Malformed(String),
    Empty,
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendFailure::Spawn(e) => write!(f, "could not start: {e}"),
            BackendFailure::Exit(code) => write!(f, "exited with code {code:?}"),
            BackendFailure::Timeout(d) => {
                write!(f, "timed out after {}", humantime::format_duration(*d))
            }
            BackendFailure::Malformed(e) => write!(f, "malformed response: {e}"),
            BackendFailure::Empty => write!(f, "no usable fields"),
        }
    }
}

/// One way of reading metadata for a file.
#[allow(async_fn_in_trait)]
pub trait MetadataBackend {
    fn source(&self) -> MetadataSource;

    async fn query(&self, path: &Path) -> Result<Metadata, BackendFailure>;
}

/// Run a read-only tool, killing it if it outlives `timeout`.
async fn capture_stdout(
    program: &Path,
    args: &[&OsStr],
    timeout: Duration,
) -> Result<String, BackendFailure> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BackendFailure::Spawn(e.to_string()))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(res) => res.map_err(|e| BackendFailure::Spawn(e.to_string()))?,
        Err(_) => return Err(BackendFailure::Timeout(timeout)),
    };
    if !output.status.success() {
        return Err(BackendFailure::Exit(output.status.code()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `<tool> info --metadata <file>`, JSON on stdout.
pub struct StructuredQuery {
    pub program: PathBuf,
    pub timeout: Duration,
}

impl MetadataBackend for StructuredQuery {
    fn source(&self) -> MetadataSource {
        MetadataSource::Structured
    }

    async fn query(&self, path: &Path) -> Result<Metadata, BackendFailure> {
        let stdout = capture_stdout(
            &self.program,
            &[OsStr::new("info"), OsStr::new("--metadata"), path.as_os_str()],
            self.timeout,
        )
        .await?;
        let meta = structured::parse(&stdout).map_err(|m| BackendFailure::Malformed(m.0))?;
        if meta.is_empty() {
            return Err(BackendFailure::Empty);
        }
        Ok(meta)
    }
}

/// `<tool> <file>`, free-text report on stdout.
pub struct TextReport {
    pub program: PathBuf,
    pub timeout: Duration,
}

impl MetadataBackend for TextReport {
    fn source(&self) -> MetadataSource {
        MetadataSource::Report
    }

    async fn query(&self, path: &Path) -> Result<Metadata, BackendFailure> {
        let stdout = capture_stdout(&self.program, &[path.as_os_str()], self.timeout).await?;
        let meta = report::parse(&stdout);
        if meta.is_empty() {
            return Err(BackendFailure::Empty);
        }
        Ok(meta)
    }
}

/// Primary/fallback pair of backends.
pub struct MetadataExtractor<A, B> {
    primary: A,
    fallback: B,
}

impl MetadataExtractor<StructuredQuery, TextReport> {
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            StructuredQuery {
                program: cfg.tools.metadata_query.clone(),
                timeout: cfg.metadata.query_timeout,
            },
            TextReport {
                program: cfg.tools.metadata_report.clone(),
                timeout: cfg.metadata.report_timeout,
            },
        )
    }
}

impl<A: MetadataBackend, B: MetadataBackend> MetadataExtractor<A, B> {
    pub fn new(primary: A, fallback: B) -> Self {
        Self { primary, fallback }
    }

    /// Metadata for `path`, or `None` when both backends come up empty.
    pub async fn extract(&self, path: &Path) -> Option<Metadata> {
        match self.primary.query(path).await {
            Ok(meta) => return Some(meta),
            Err(e) => tracing::info!(
                backend = self.primary.source().as_str(),
                file = %path.display(),
                reason = %e,
                "primary metadata backend failed, trying fallback"
            ),
        }
        match self.fallback.query(path).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(
                    backend = self.fallback.source().as_str(),
                    file = %path.display(),
                    reason = %e,
                    "metadata unavailable"
                );
                None
            }
        }
    }

    /// Like [`extract`](Self::extract), but absence is an error.
    pub async fn require(&self, path: &Path) -> crate::error::Result<Metadata> {
        self.extract(path)
            .await
            .ok_or_else(|| WorkflowError::MetadataUnavailable {
                path: path.to_path_buf(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Canned {
        source: MetadataSource,
        result: fn() -> Result<Metadata, BackendFailure>,
        calls: Cell<usize>,
    }

    impl Canned {
        fn new(source: MetadataSource, result: fn() -> Result<Metadata, BackendFailure>) -> Self {
            Self {
                source,
                result,
                calls: Cell::new(0),
            }
        }
    }

    impl MetadataBackend for Canned {
        fn source(&self) -> MetadataSource {
            self.source
        }

        async fn query(&self, _path: &Path) -> Result<Metadata, BackendFailure> {
            self.calls.set(self.calls.get() + 1);
            (self.result)()
        }
    }

    fn one_field(source: MetadataSource) -> Metadata {
        Metadata {
            point_count: Some(7),
            source: Some(source),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn primary_with_fields_skips_fallback() {
        let extractor = MetadataExtractor::new(
            Canned::new(MetadataSource::Structured, || {
                Ok(one_field(MetadataSource::Structured))
            }),
            Canned::new(MetadataSource::Report, || {
                Ok(one_field(MetadataSource::Report))
            }),
        );

        let meta = extractor.extract(Path::new("a.las")).await.unwrap();
        assert_eq!(meta.source, Some(MetadataSource::Structured));
        assert_eq!(extractor.primary.calls.get(), 1);
        assert_eq!(extractor.fallback.calls.get(), 0);
    }

    #[tokio::test]
    async fn empty_primary_falls_back_without_merging() {
        let extractor = MetadataExtractor::new(
            Canned::new(MetadataSource::Structured, || Err(BackendFailure::Empty)),
            Canned::new(MetadataSource::Report, || {
                Ok(one_field(MetadataSource::Report))
            }),
        );

        let meta = extractor.extract(Path::new("a.las")).await.unwrap();
        assert_eq!(meta.source, Some(MetadataSource::Report));
        assert_eq!(meta.field_count(), 1);
        assert_eq!(extractor.fallback.calls.get(), 1);
    }

    #[tokio::test]
    async fn both_empty_is_absent() {
        let extractor = MetadataExtractor::new(
            Canned::new(MetadataSource::Structured, || {
                Err(BackendFailure::Timeout(Duration::from_secs(30)))
            }),
            Canned::new(MetadataSource::Report, || Err(BackendFailure::Empty)),
        );
        assert!(extractor.extract(Path::new("a.las")).await.is_none());
        let err = extractor.require(Path::new("a.las")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MetadataUnavailable { .. }));
        assert!(err.to_string().contains("a.las"));
    }

    #[cfg(unix)]
    mod with_tools {
        use super::*;
        use crate::engine::test_support::{fake_tool, was_called};

        #[tokio::test]
        async fn slow_query_and_unmatched_report_yield_none() {
            let dir = tempfile::tempdir().unwrap();
            let extractor = MetadataExtractor::new(
                StructuredQuery {
                    program: fake_tool(dir.path(), "pdal", "exec sleep 5\n"),
                    timeout: Duration::from_millis(200),
                },
                TextReport {
                    program: fake_tool(dir.path(), "lasinfo", "echo 'nothing useful here'\n"),
                    timeout: Duration::from_secs(5),
                },
            );

            let started = std::time::Instant::now();
            assert!(extractor.extract(Path::new("site.las")).await.is_none());
            assert!(started.elapsed() < Duration::from_secs(4));
            assert!(was_called(&extractor.fallback.program));
        }

        #[tokio::test]
        async fn query_success_never_runs_report_tool() {
            let dir = tempfile::tempdir().unwrap();
            let extractor = MetadataExtractor::new(
                StructuredQuery {
                    program: fake_tool(
                        dir.path(),
                        "pdal",
                        "[ \"$1 $2\" = \"info --metadata\" ] || exit 2\necho '{\"metadata\":{\"count\":12}}'\n",
                    ),
                    timeout: Duration::from_secs(5),
                },
                TextReport {
                    program: fake_tool(dir.path(), "lasinfo", "echo 'Number of Point Records: 99'\n"),
                    timeout: Duration::from_secs(5),
                },
            );

            let meta = extractor.extract(Path::new("site.las")).await.unwrap();
            assert_eq!(meta.point_count, Some(12));
            assert_eq!(meta.source, Some(MetadataSource::Structured));
            assert!(!was_called(&extractor.fallback.program));
        }

        #[tokio::test]
        async fn failing_query_uses_report() {
            let dir = tempfile::tempdir().unwrap();
            let extractor = MetadataExtractor::new(
                StructuredQuery {
                    program: fake_tool(dir.path(), "pdal", "echo 'not json'\n"),
                    timeout: Duration::from_secs(5),
                },
                TextReport {
                    program: fake_tool(
                        dir.path(),
                        "lasinfo",
                        "echo '  Number of Point Records:    99'\necho '  Min X Y Z:   1 2 3'\n",
                    ),
                    timeout: Duration::from_secs(5),
                },
            );

            let meta = extractor.extract(Path::new("site.las")).await.unwrap();
            assert_eq!(meta.point_count, Some(99));
            assert_eq!(meta.source, Some(MetadataSource::Report));
        }
    }
}

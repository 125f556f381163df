//! Divider config artifacts.
//!
//! Every write lands in a fresh file, so concurrent divide runs never read
//! each other's parameters. Files are left behind for the divider to read;
//! nothing here removes them.

use crate::error::{Result, WorkflowError};
use crate::model::DivideConfig;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk layout read by the divider.
#[derive(Debug, Serialize)]
struct ArtifactFile {
    pointcloud_divider: DividerSection,
}

#[derive(Debug, Serialize)]
struct DividerSection {
    grid_size_x: f64,
    grid_size_y: f64,
    leaf_size: f64,
    merge_pcds: bool,
    use_large_grid: bool,
}

impl From<&DivideConfig> for ArtifactFile {
    fn from(cfg: &DivideConfig) -> Self {
        Self {
            pointcloud_divider: DividerSection {
                grid_size_x: cfg.grid_size_x,
                grid_size_y: cfg.grid_size_y,
                leaf_size: cfg.leaf_size,
                merge_pcds: cfg.merge_outputs,
                use_large_grid: false,
            },
        }
    }
}

pub struct ConfigArtifactWriter {
    dir: PathBuf,
}

impl ConfigArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist `cfg` to a new, uniquely named YAML file and return its path.
    pub fn write(&self, cfg: &DivideConfig) -> Result<PathBuf> {
        let fail = |path: &Path, source: std::io::Error| WorkflowError::ConfigWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let yaml = serde_yaml::to_string(&ArtifactFile::from(cfg))
            .map_err(|e| fail(&self.dir, std::io::Error::other(e)))?;

        std::fs::create_dir_all(&self.dir).map_err(|e| fail(&self.dir, e))?;
        let mut file = tempfile::Builder::new()
            .prefix("pointcloud_divider_")
            .suffix(".yaml")
            .tempfile_in(&self.dir)
            .map_err(|e| fail(&self.dir, e))?;
        file.write_all(yaml.as_bytes())
            .map_err(|e| fail(file.path(), e))?;
        file.flush().map_err(|e| fail(file.path(), e))?;

        let (_, path) = file.keep().map_err(|e| fail(&self.dir, e.error))?;
        tracing::debug!(path = %path.display(), "wrote divider config");
        Ok(path)
    }
}

//! Executable locations and tool timeouts.
//!
//! Resolved once at startup: built-in defaults, then an optional YAML file,
//! then `PCMAP_*` environment overrides.

use crate::model::ConversionKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolPaths,

    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Directory for divider config artifacts (default: system temp dir)
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

/// Executable per role. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPaths {
    #[serde(default = "default_rgb_converter")]
    pub rgb_converter: PathBuf,

    #[serde(default = "default_intensity_converter")]
    pub intensity_converter: PathBuf,

    #[serde(default = "default_divider")]
    pub divider: PathBuf,

    #[serde(default = "default_enhancer")]
    pub enhancer: PathBuf,

    /// Structured metadata tool, invoked as `<tool> info --metadata <file>`
    #[serde(default = "default_metadata_query")]
    pub metadata_query: PathBuf,

    /// Text report tool, invoked as `<tool> <file>`
    #[serde(default = "default_metadata_report")]
    pub metadata_report: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            rgb_converter: default_rgb_converter(),
            intensity_converter: default_intensity_converter(),
            divider: default_divider(),
            enhancer: default_enhancer(),
            metadata_query: default_metadata_query(),
            metadata_report: default_metadata_report(),
        }
    }
}

impl ToolPaths {
    pub fn converter(&self, kind: ConversionKind) -> &Path {
        match kind {
            ConversionKind::Rgb => &self.rgb_converter,
            ConversionKind::Intensity => &self.intensity_converter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_query_timeout", with = "humantime_serde")]
    pub query_timeout: Duration,

    #[serde(default = "default_report_timeout", with = "humantime_serde")]
    pub report_timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            query_timeout: default_query_timeout(),
            report_timeout: default_report_timeout(),
        }
    }
}

/// Environment variables consulted after the config file.
pub const ENV_OVERRIDES: &[&str] = &[
    "PCMAP_RGB_CONVERTER",
    "PCMAP_INTENSITY_CONVERTER",
    "PCMAP_DIVIDER",
    "PCMAP_ENHANCER",
    "PCMAP_METADATA_QUERY",
    "PCMAP_METADATA_REPORT",
    "PCMAP_ARTIFACT_DIR",
];

impl Config {
    /// Load configuration from a YAML or JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Per-user config file, used when no explicit path is given.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pcmap").join("config.yaml"))
    }

    /// Resolve the effective configuration.
    ///
    /// An explicit path must exist; the per-user default is optional.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `PCMAP_*` overrides from the given lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in ENV_OVERRIDES {
            let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            let path = PathBuf::from(value);
            match *key {
                "PCMAP_RGB_CONVERTER" => self.tools.rgb_converter = path,
                "PCMAP_INTENSITY_CONVERTER" => self.tools.intensity_converter = path,
                "PCMAP_DIVIDER" => self.tools.divider = path,
                "PCMAP_ENHANCER" => self.tools.enhancer = path,
                "PCMAP_METADATA_QUERY" => self.tools.metadata_query = path,
                "PCMAP_METADATA_REPORT" => self.tools.metadata_report = path,
                "PCMAP_ARTIFACT_DIR" => self.artifact_dir = Some(path),
                _ => {}
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let tools = [
            ("rgb_converter", &self.tools.rgb_converter),
            ("intensity_converter", &self.tools.intensity_converter),
            ("divider", &self.tools.divider),
            ("enhancer", &self.tools.enhancer),
            ("metadata_query", &self.tools.metadata_query),
            ("metadata_report", &self.tools.metadata_report),
        ];
        for (name, path) in tools {
            if path.as_os_str().is_empty() {
                anyhow::bail!("tools.{name} must not be empty");
            }
        }
        if self.metadata.query_timeout.is_zero() || self.metadata.report_timeout.is_zero() {
            anyhow::bail!("metadata timeouts must be > 0");
        }
        Ok(())
    }

    /// Directory used for divider config artifacts.
    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

// Default value functions for serde
fn default_rgb_converter() -> PathBuf { PathBuf::from("las2pcd") }
fn default_intensity_converter() -> PathBuf { PathBuf::from("las2pcd_intensity") }
fn default_divider() -> PathBuf { PathBuf::from("pointcloud_divider") }
fn default_enhancer() -> PathBuf { PathBuf::from("pcd_enhancer") }
fn default_metadata_query() -> PathBuf { PathBuf::from("pdal") }
fn default_metadata_report() -> PathBuf { PathBuf::from("lasinfo") }
fn default_query_timeout() -> Duration { Duration::from_secs(30) }
fn default_report_timeout() -> Duration { Duration::from_secs(10) }

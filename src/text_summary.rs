//! Text summary builder for metadata inspection.
//!
//! Formats extracted header metadata, or the remediation diagnostic when no
//! backend could read the file.

use crate::model::{Metadata, MetadataSource};
use std::path::Path;

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

fn source_name(source: MetadataSource) -> &'static str {
    match source {
        MetadataSource::Structured => "structured query (A)",
        MetadataSource::Report => "text report (B)",
    }
}

/// Build a summary for `path`. `file_size_mb` is shown when known.
pub fn build_metadata_summary(
    path: &Path,
    file_size_mb: Option<f64>,
    metadata: Option<&Metadata>,
    query_tool: &Path,
) -> TextSummary {
    let mut lines = Vec::new();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    lines.push(format!("File: {name}"));
    if let Some(size) = file_size_mb {
        lines.push(format!("File size: {size:.2} MB"));
    }

    let Some(meta) = metadata.filter(|m| !m.is_empty()) else {
        lines.extend(unavailable_diagnostic(path, query_tool));
        return TextSummary { lines };
    };

    if let Some(source) = meta.source {
        lines.push(format!("Read with: {}", source_name(source)));
    }
    if let Some(version) = meta.format_version.as_deref() {
        lines.push(String::new());
        lines.push(format!("LAS version: {version}"));
    }
    if let Some(count) = meta.point_count {
        lines.push(format!("Point count: {}", group_thousands(count)));
    }
    if let Some(software) = meta.software.as_deref() {
        lines.push(format!("Generating software: {software}"));
    }
    if let Some(system) = meta.system.as_deref() {
        lines.push(format!("System identifier: {system}"));
    }
    if let Some(offset) = meta.offset {
        lines.push(String::new());
        lines.push("Origin offset:".to_string());
        lines.push(format!("   X: {:.12}", offset.x));
        lines.push(format!("   Y: {:.12}", offset.y));
        lines.push(format!("   Z: {:.12}", offset.z));
        lines.push("   RGB conversion uses this offset as its default origin".to_string());
    }
    if let (Some(min), Some(max)) = (meta.bounds_min, meta.bounds_max) {
        lines.push(String::new());
        lines.push("Bounds:".to_string());
        lines.push(format!("   X: [{:.2}, {:.2}]", min.x, max.x));
        lines.push(format!("   Y: [{:.2}, {:.2}]", min.y, max.y));
        lines.push(format!("   Z: [{:.2}, {:.2}]", min.z, max.z));
    }
    if let Some(scale) = meta.scale {
        lines.push(String::new());
        lines.push(format!(
            "Scale: X {:.10} / Y {:.10} / Z {:.10}",
            scale.x, scale.y, scale.z
        ));
    }

    TextSummary { lines }
}

fn unavailable_diagnostic(path: &Path, query_tool: &Path) -> Vec<String> {
    let tool = query_tool.display();
    vec![
        String::new(),
        "Could not read detailed LAS metadata.".to_string(),
        String::new(),
        "Possible causes:".to_string(),
        "  - the metadata tools (pdal / lasinfo) are not installed or not on PATH".to_string(),
        "  - the file is not a valid LAS/LAZ file".to_string(),
        "  - the file cannot be read (permissions)".to_string(),
        String::new(),
        "To fix:".to_string(),
        format!("  1. Check the tool is available: which {tool}"),
        "  2. Install it, e.g.: sudo apt-get install pdal".to_string(),
        format!("  3. Test manually: {tool} info --metadata {}", path.display()),
    ]
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

//! File naming conventions shared by the CLI and the engine.

use std::ffi::OsString;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

pub const PCD_EXTENSION: &str = "pcd";

/// Prefix the guided pipeline always hands to the divider.
pub const PIPELINE_PREFIX: &str = "pointcloud_map";

/// Append `.ext` unless the name already ends with it. Idempotent.
pub fn ensure_extension(name: &str, ext: &str) -> String {
    let suffix = format!(".{ext}");
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

/// File name without its last extension (`scan.v2.las` -> `scan.v2`).
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<dir>/<input stem>.pcd`
pub fn default_output(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(ensure_extension(&base_name(input), PCD_EXTENSION))
}

/// `<dir>/<name>` with a `.pcd` extension guaranteed.
pub fn named_output(name: &str, output_dir: &Path) -> PathBuf {
    let name = name.trim();
    let name = if name.is_empty() { "unnamed" } else { name };
    output_dir.join(ensure_extension(name, PCD_EXTENSION))
}

/// Intermediate file written by the pipeline's convert stage.
pub fn pipeline_temp(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}_temp.{PCD_EXTENSION}", base_name(input)))
}

const ENHANCED_SUFFIX: &str = "_enhanced";

/// Sibling `<stem>_enhanced.pcd` next to a divided tile.
pub fn enhanced_sibling(tile: &Path) -> PathBuf {
    tile.with_file_name(format!(
        "{}{ENHANCED_SUFFIX}.{PCD_EXTENSION}",
        base_name(tile)
    ))
}

/// The divider expects its output directory with a trailing separator.
pub fn with_trailing_separator(dir: &Path) -> OsString {
    let mut s = dir.as_os_str().to_os_string();
    if !s.to_string_lossy().ends_with(MAIN_SEPARATOR) {
        s.push(MAIN_SEPARATOR.to_string());
    }
    s
}

pub fn metadata_file_name(prefix: &str) -> String {
    format!("{prefix}_metadata.yaml")
}

/// Does `name` look like a divider tile `<prefix>_*.pcd`?
///
/// Enhancement siblings left behind by an interrupted run are not tiles.
pub fn is_tile_name(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(&format!(".{PCD_EXTENSION}")))
        .is_some_and(|stem| !stem.ends_with(ENHANCED_SUFFIX))
}

/// Divider tiles in `dir`, sorted by file name. Missing directory yields none.
pub fn list_tiles(dir: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut tiles = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if is_tile_name(&name.to_string_lossy(), prefix) && entry.path().is_file() {
            tiles.push(entry.path());
        }
    }
    tiles.sort();
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_appended_once() {
        assert_eq!(ensure_extension("tile", "pcd"), "tile.pcd");
        assert_eq!(ensure_extension("tile.pcd", "pcd"), "tile.pcd");
        let once = ensure_extension("scan.las", "pcd");
        assert_eq!(once, "scan.las.pcd");
        assert_eq!(ensure_extension(&once, "pcd"), once);
    }

    #[test]
    fn outputs_derive_from_input_stem() {
        let dir = Path::new("/data/out");
        assert_eq!(
            default_output(Path::new("/in/site_a.las"), dir),
            PathBuf::from("/data/out/site_a.pcd")
        );
        assert_eq!(
            pipeline_temp(Path::new("/in/site_a.las"), dir),
            PathBuf::from("/data/out/site_a_temp.pcd")
        );
        assert_eq!(
            named_output("  ", dir),
            PathBuf::from("/data/out/unnamed.pcd")
        );
    }

    #[test]
    fn enhanced_sibling_keeps_directory() {
        assert_eq!(
            enhanced_sibling(Path::new("/out/pointcloud_map_003.pcd")),
            PathBuf::from("/out/pointcloud_map_003_enhanced.pcd")
        );
    }

    #[cfg(unix)]
    #[test]
    fn trailing_separator_added_once() {
        assert_eq!(with_trailing_separator(Path::new("/out")), OsString::from("/out/"));
        assert_eq!(with_trailing_separator(Path::new("/out/")), OsString::from("/out/"));
    }

    #[test]
    fn tile_names_match_prefix_convention() {
        assert!(is_tile_name("pointcloud_map_000.pcd", PIPELINE_PREFIX));
        assert!(!is_tile_name("pointcloud_map_metadata.yaml", PIPELINE_PREFIX));
        assert!(!is_tile_name("pointcloud_mapX_000.pcd", PIPELINE_PREFIX));
        assert!(!is_tile_name("scan_temp.pcd", PIPELINE_PREFIX));
        assert!(!is_tile_name("pointcloud_map_000_enhanced.pcd", PIPELINE_PREFIX));
    }

    #[test]
    fn list_tiles_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "pointcloud_map_002.pcd",
            "pointcloud_map_000.pcd",
            "pointcloud_map_metadata.yaml",
            "other.pcd",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let tiles = list_tiles(dir.path(), PIPELINE_PREFIX).unwrap();
        let names: Vec<_> = tiles
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["pointcloud_map_000.pcd", "pointcloud_map_002.pcd"]);
        assert!(list_tiles(&dir.path().join("missing"), PIPELINE_PREFIX)
            .unwrap()
            .is_empty());
    }
}

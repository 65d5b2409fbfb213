//! Units backed by plugin archives on disk.

use std::path::{Path, PathBuf};
use unitbridge_core::{EnumerationError, HostUnits, InventoryEntry};
use walkdir::WalkDir;

/// Every `Name-1.2.3.jar` directly inside `root` is a unit.
pub struct PluginDirectory {
    root: PathBuf,
}

impl PluginDirectory {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl HostUnits for PluginDirectory {
    fn enumerate_units(&self) -> Result<Vec<InventoryEntry>, EnumerationError> {
        let mut units = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| EnumerationError::new(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(unit) = parse_archive(entry.path()) {
                units.push(unit);
            }
        }
        Ok(units)
    }
}

/// `Name-1.2.3.jar` -> (`Name`, `1.2.3`); no version suffix -> `unknown`.
fn parse_archive(path: &Path) -> Option<InventoryEntry> {
    if path.extension()? != "jar" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let unit = match stem.rsplit_once('-') {
        Some((name, version))
            if !name.is_empty() && version.starts_with(|c: char| c.is_ascii_digit()) =>
        {
            InventoryEntry::new(name, version)
        }
        _ => InventoryEntry::new(stem, "unknown"),
    };
    Some(unit.with_resource(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_version() {
        let unit = parse_archive(Path::new("plugins/WorldEdit-7.3.0.jar")).unwrap();
        assert_eq!(unit.name, "WorldEdit");
        assert_eq!(unit.version, "7.3.0");
    }

    #[test]
    fn hyphenated_names_keep_their_hyphens() {
        let unit = parse_archive(Path::new("Core-Protect-22.4.jar")).unwrap();
        assert_eq!(unit.name, "Core-Protect");
        assert_eq!(unit.version, "22.4");
    }

    #[test]
    fn missing_version_is_unknown() {
        let unit = parse_archive(Path::new("Essentials.jar")).unwrap();
        assert_eq!(unit.name, "Essentials");
        assert_eq!(unit.version, "unknown");
    }

    #[test]
    fn non_archives_are_ignored() {
        assert!(parse_archive(Path::new("config.yml")).is_none());
        assert!(parse_archive(Path::new("README")).is_none());
    }

    #[test]
    fn enumerates_top_level_archives_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("beta-1.0.jar"), b"").unwrap();
        std::fs::write(dir.path().join("Alpha-2.0.jar"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("Alpha")).unwrap();
        std::fs::write(dir.path().join("Alpha").join("Nested-1.0.jar"), b"").unwrap();

        let mut names: Vec<String> = PluginDirectory::new(dir.path().to_path_buf())
            .enumerate_units()
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Alpha", "beta"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let units = PluginDirectory::new(dir.path().join("absent"));
        assert!(units.enumerate_units().is_err());
    }
}

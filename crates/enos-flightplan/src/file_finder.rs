// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Locating and reading configuration files.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// File names of flight plan files: `enos.hcl`, `enos-scenario-a.hcl`, ...
pub static FLIGHT_PLAN_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^enos[-\w]*?\.hcl$").expect("flight plan file regex is valid"));

/// File names of variables files: `enos.vars.hcl`, `enos-ci.vars.hcl`, ...
pub static VARIABLES_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^enos[-\w]*?\.vars\.hcl$").expect("variables file regex is valid"));

/// Configuration file contents keyed by path.
pub type RawFiles = BTreeMap<PathBuf, String>;

/// Reads every file directly inside `dir` whose name matches `pattern`.
/// Subdirectories are not searched.
pub fn find_raw_files(dir: &Path, pattern: &Regex) -> Result<RawFiles> {
    let mut files = RawFiles::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !pattern.is_match(name) {
            continue;
        }

        let path = entry.path();
        debug!(path = %path.display(), "reading configuration file");
        let contents = fs::read_to_string(&path)?;
        files.insert(path, contents);
    }

    Ok(files)
}

/// Reads the given files. Paths are made absolute and symlinks are resolved.
pub fn load_raw_files<P: AsRef<Path>>(paths: &[P]) -> Result<RawFiles> {
    let mut files = RawFiles::new();

    for path in paths {
        let path = fs::canonicalize(path.as_ref())?;
        let contents = fs::read_to_string(&path)?;
        files.insert(path, contents);
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_patterns() {
        for name in ["enos.hcl", "enos-scenario.hcl", "enos_x.hcl"] {
            assert!(FLIGHT_PLAN_FILE_PATTERN.is_match(name), "{}", name);
        }
        for name in ["main.hcl", "enos.tf", "xenos.hcl"] {
            assert!(!FLIGHT_PLAN_FILE_PATTERN.is_match(name), "{}", name);
        }
        assert!(VARIABLES_FILE_PATTERN.is_match("enos.vars.hcl"));
        assert!(VARIABLES_FILE_PATTERN.is_match("enos-local.vars.hcl"));
        assert!(!VARIABLES_FILE_PATTERN.is_match("enos.hcl"));
    }

    #[test]
    fn test_find_raw_files_single_level() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("enos.hcl"), "a = 1").unwrap();
        fs::write(dir.path().join("enos-two.hcl"), "b = 2").unwrap();
        fs::write(dir.path().join("other.hcl"), "c = 3").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("enos.hcl"), "d = 4").unwrap();

        let files = find_raw_files(dir.path(), &FLIGHT_PLAN_FILE_PATTERN).unwrap();
        let names: Vec<_> = files
            .keys()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["enos-two.hcl", "enos.hcl"]);
        assert_eq!(files[&dir.path().join("enos.hcl")], "a = 1");
    }

    #[test]
    fn test_load_raw_files_resolves_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("enos.vars.hcl");
        fs::write(&path, "x = 1").unwrap();

        let files = load_raw_files(&[&path]).unwrap();
        let (loaded, contents) = files.iter().next().unwrap();
        assert!(loaded.is_absolute());
        assert_eq!(contents, "x = 1");

        assert!(load_raw_files(&[dir.path().join("missing.hcl")]).is_err());
    }
}

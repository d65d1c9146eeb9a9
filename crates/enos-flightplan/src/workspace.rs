// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workspaces: a flight plan directory and its inputs.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::file_finder::{FLIGHT_PLAN_FILE_PATTERN, RawFiles, VARIABLES_FILE_PATTERN, find_raw_files, load_raw_files};

/// The raw inputs of a decode: configuration files, variables and where
/// generated modules go.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    /// Absolute flight plan directory.
    pub base_dir: PathBuf,
    /// `enos*.hcl` files.
    pub flight_plan_files: RawFiles,
    /// `enos*.vars.hcl` files.
    pub var_files: RawFiles,
    /// `KEY=value` environment entries.
    pub env: Vec<String>,
    /// Where generated modules are written.
    pub out_dir: Option<PathBuf>,
}

impl Workspace {
    /// Reads the flight plan and variables files directly inside `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = std::fs::canonicalize(dir.as_ref())?;
        let flight_plan_files = find_raw_files(&base_dir, &FLIGHT_PLAN_FILE_PATTERN)?;
        let var_files = find_raw_files(&base_dir, &VARIABLES_FILE_PATTERN)?;

        debug!(
            base_dir = %base_dir.display(),
            flight_plan_files = flight_plan_files.len(),
            var_files = var_files.len(),
            "loaded workspace"
        );

        Ok(Self {
            base_dir,
            flight_plan_files,
            var_files,
            ..Self::default()
        })
    }

    /// Adds variables files in addition to those found in the directory.
    pub fn with_var_files<P: AsRef<Path>>(mut self, paths: &[P]) -> Result<Self> {
        self.var_files.extend(load_raw_files(paths)?);
        Ok(self)
    }

    /// Sets `KEY=value` environment entries, usually `std::env::vars()`.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Sets the output directory for generated modules.
    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(out_dir.into());
        self
    }

    /// A decoder over the workspace's inputs.
    pub fn decoder(&self) -> Result<Decoder> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(Error::InvalidValue("workspace has no base directory".to_string()));
        }

        Ok(Decoder::new(self.base_dir.clone())
            .with_fp_files(self.flight_plan_files.clone())
            .with_var_files(self.var_files.clone())
            .with_env(self.env.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_separates_var_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("enos.hcl"), "").unwrap();
        fs::write(dir.path().join("enos-modules.hcl"), "").unwrap();
        fs::write(dir.path().join("enos.vars.hcl"), "").unwrap();
        fs::write(dir.path().join("other.hcl"), "").unwrap();

        let ws = Workspace::load(dir.path()).unwrap();
        assert_eq!(ws.flight_plan_files.len(), 2);
        assert_eq!(ws.var_files.len(), 1);
        assert!(ws.base_dir.is_absolute());
        assert!(ws.decoder().is_ok());
    }

    #[test]
    fn test_extra_var_files() {
        let dir = TempDir::new().unwrap();
        let extra = dir.path().join("ci.vars.hcl");
        fs::write(&extra, "region = \"us-west-2\"\n").unwrap();

        let ws = Workspace::load(dir.path()).unwrap().with_var_files(&[&extra]).unwrap();
        assert_eq!(ws.var_files.len(), 1);
        assert!(Workspace::load(dir.path()).unwrap().with_var_files(&[dir.path().join("missing.hcl")]).is_err());
    }

    #[test]
    fn test_decoder_requires_base_dir() {
        assert!(Workspace::default().decoder().is_err());
    }
}

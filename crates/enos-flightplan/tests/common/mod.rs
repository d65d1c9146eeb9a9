// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for flight plan integration tests.

#![allow(dead_code)]

use enos_flightplan::Workspace;
use std::fs;
use tempfile::TempDir;

/// A flight plan directory that is removed when dropped.
pub struct TestFlightPlan {
    pub dir: TempDir,
    pub workspace: Workspace,
}

/// Writes `enos.hcl` (and `enos.vars.hcl` when given) into a fresh directory
/// and loads it as a workspace.
pub fn flight_plan(src: &str, vars: Option<&str>) -> TestFlightPlan {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(dir.path().join("enos.hcl"), src).expect("Failed to write flight plan");
    if let Some(vars) = vars {
        fs::write(dir.path().join("enos.vars.hcl"), vars).expect("Failed to write vars file");
    }
    let workspace = Workspace::load(dir.path()).expect("Failed to load workspace");
    TestFlightPlan { dir, workspace }
}

/// A noop module whose source is an absolute path inside the flight plan directory.
pub fn abs_module(dir: &TempDir) -> String {
    let path = dir.path().join("modules").join("noop");
    fs::create_dir_all(&path).expect("Failed to create module dir");
    format!(
        r#"
module "m" {{
  source = "{}"
}}
"#,
        path.display()
    )
}

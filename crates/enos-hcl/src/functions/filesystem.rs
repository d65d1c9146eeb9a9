// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filesystem functions. Relative paths resolve against the directory the
//! configuration was loaded from.

use super::{Function, FunctionError, FunctionTable, Param, str_at};
use crate::value::{Type, Value};
use std::path::{Component, Path, PathBuf};

pub(super) fn register(table: &mut FunctionTable, base_dir: &Path) {
    let base = base_dir.to_path_buf();
    table.insert(
        "abspath",
        Function::new(vec![Param::new("path", Type::String)], move |a| {
            Ok(Value::string(clean(&base.join(str_at(a, 0))).to_string_lossy()))
        }),
    );

    let base = base_dir.to_path_buf();
    table.insert(
        "file",
        Function::new(vec![Param::new("path", Type::String)], move |a| {
            let path = base.join(str_at(a, 0));
            std::fs::read_to_string(&path)
                .map(Value::string)
                .map_err(|e| FunctionError::call(format!("failed to read file {}: {}", path.display(), e)))
        }),
    );

    table.insert(
        "joinpath",
        Function::new(vec![], |a| {
            let mut path = PathBuf::new();
            for v in a {
                path.push(v.as_str().unwrap_or_default());
            }
            Ok(Value::string(clean(&path).to_string_lossy()))
        })
        .variadic(Param::new("paths", Type::String)),
    );
}

/// Lexically normalizes a path, resolving `.` and `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(base: &Path) -> FunctionTable {
        let mut t = FunctionTable::new();
        register(&mut t, base);
        t
    }

    #[test]
    fn test_abspath_relative_to_base() {
        let t = table(Path::new("/enos/scenarios"));
        let got = t.get("abspath").unwrap().call(&[Value::string("../modules/./vpc")]).unwrap();
        assert_eq!(got, Value::string("/enos/modules/vpc"));
    }

    #[test]
    fn test_file_reads_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("license.hclic"), "secret").unwrap();
        let t = table(dir.path());
        let got = t.get("file").unwrap().call(&[Value::string("license.hclic")]).unwrap();
        assert_eq!(got, Value::string("secret"));
        assert!(t.get("file").unwrap().call(&[Value::string("missing")]).is_err());
    }

    #[test]
    fn test_joinpath() {
        let t = table(Path::new("/"));
        let got = t
            .get("joinpath")
            .unwrap()
            .call(&[Value::string("a"), Value::string("b"), Value::string("../c")])
            .unwrap();
        assert_eq!(got, Value::string("a/c"));
    }
}

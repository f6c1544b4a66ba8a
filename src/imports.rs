//! Import detection for Python sources
//!
//! Scans a script for top-level `import` / `from` statements and proposes the
//! root package names as hidden imports. This is a line-based scan, not a
//! Python parser: imports inside strings or behind `if` blocks with deeper
//! indentation are still picked up, continuation lines are not.

use crate::error::{Result, ResultExt};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Standard-library modules PyInstaller always finds on its own
pub const SKIPPED_MODULES: &[&str] = &[
    "sys",
    "os",
    "json",
    "datetime",
    "pathlib",
    "threading",
    "subprocess",
    "re",
    "math",
    "random",
    "time",
];

lazy_static! {
    static ref IMPORT_RE: Regex = Regex::new(r"^import\s+(.+)$").unwrap();
    static ref FROM_RE: Regex = Regex::new(r"^from\s+(\S+)\s+import\b").unwrap();
}

/// Root module names imported by `source`, sorted, without skipped modules
pub fn detect_imports(source: &str) -> Vec<String> {
    let mut modules = BTreeSet::new();

    for line in source.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();

        if let Some(caps) = IMPORT_RE.captures(line) {
            for part in caps[1].split(',') {
                let name = part.trim().split(" as ").next().unwrap_or_default();
                if let Some(root) = root_module(name) {
                    modules.insert(root);
                }
            }
        } else if let Some(caps) = FROM_RE.captures(line) {
            if let Some(root) = root_module(&caps[1]) {
                modules.insert(root);
            }
        }
    }

    debug!("Detected imports: {:?}", modules);
    modules
        .into_iter()
        .filter(|name| !SKIPPED_MODULES.contains(&name.as_str()))
        .collect()
}

/// Read `path` and run [`detect_imports`] on it
pub fn detect_imports_in_file(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).with_path_context("read source", path)?;
    Ok(detect_imports(&String::from_utf8_lossy(&bytes)))
}

/// First dotted segment; relative imports have none
fn root_module(name: &str) -> Option<String> {
    let name = name.trim();
    if name.starts_with('.') {
        return None;
    }
    name.split('.')
        .next()
        .map(str::trim)
        .filter(|root| !root.is_empty() && root.chars().all(|c| c.is_alphanumeric() || c == '_'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_forms() {
        let source = "\
import numpy as np, pandas
import PyQt5.QtWidgets
from flask import Flask
from .local import helper
from . import sibling
    import requests
";
        assert_eq!(
            detect_imports(source),
            vec!["PyQt5", "flask", "numpy", "pandas", "requests"]
        );
    }

    #[test]
    fn test_standard_modules_are_skipped() {
        let source = "import os, sys\nfrom pathlib import Path\nimport json\nimport yaml\n";
        assert_eq!(detect_imports(source), vec!["yaml"]);
    }

    #[test]
    fn test_non_import_lines_ignored() {
        let source = "# import secret\nprint('from here import nothing')\nimported = 1\n";
        assert!(detect_imports(source).is_empty());
    }

    #[test]
    fn test_trailing_comments() {
        let source = "import numpy  # arrays\nimport scipy, attrs # two\nfrom rich import print  # pretty\n";
        assert_eq!(detect_imports(source), vec!["attrs", "numpy", "rich", "scipy"]);
    }
}

use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};

use cos_config::resolve_rule_paths;
use cos_core::{Checker, Dialect, RulesError, ct_debug};

const RED: &str = "\x1b[1;31m";
const GREEN: &str = "\x1b[1;32m";
const RESET: &str = "\x1b[0m";

fn print_diag(file: &Path, message: &str, color: bool) {
    if color {
        eprintln!("{RED}error{RESET}: {}: {message}", file.display());
    } else {
        eprintln!("error: {}: {message}", file.display());
    }
}

fn report(file: &Path, err: &RulesError, color: bool) {
    match err {
        RulesError::Decode { source, .. } => print_diag(file, &source.to_string(), color),
        RulesError::Invalid { errors, .. } => {
            for e in errors {
                print_diag(file, &e.to_string(), color);
            }
        }
    }
}

/// Validate every file, printing each violation. Returns the number of files
/// that failed.
pub fn check_files(dialect: Dialect, patterns: &[String], color: bool) -> Result<usize> {
    let files = resolve_rule_paths(patterns)?;
    let mut failed = 0;

    for file in &files {
        let content =
            std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        let name = file.display().to_string();
        match dialect.validate_rules(&name, &content) {
            Ok(groups) => {
                ct_debug!(rules, file = %name, groups = groups.groups.len(), "ok");
            }
            Err(err) => {
                failed += 1;
                report(file, &err, color);
            }
        }
    }

    if failed == 0 {
        if color {
            eprintln!("{GREEN}No issues found.{RESET}");
        } else {
            eprintln!("No issues found.");
        }
    } else {
        let total = files.len();
        if color {
            eprintln!("\n\x1b[1m{RED}{failed} of {total} file(s) invalid{RESET}");
        } else {
            eprintln!("\n{failed} of {total} file(s) invalid");
        }
    }
    Ok(failed)
}

/// Returns `true` when every file is valid.
pub fn run(dialect: Dialect, files: Vec<String>) -> Result<bool> {
    let color = std::io::stderr().is_terminal();
    Ok(check_files(dialect, &files, color)? == 0)
}

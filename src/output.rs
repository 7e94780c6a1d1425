//! CLI output formatting.
//!
//! Each command has a `format_*` function returning lines (pure, testable)
//! and a `print_*` wrapper that writes them to stdout.
//!
//! ## Compile
//!
//! ```text
//! Compiled
//!     home
//!     about
//! Up to date
//!     contact
//!
//! Compiled 2 pages, 1 up to date
//! ```
//!
//! ## Info
//!
//! Entry fields as pretty JSON, one key per line.

use crate::bundle::CompileReport;
use serde_json::{Map, Value};

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

pub fn format_compile_output(report: &CompileReport) -> Vec<String> {
    let mut lines = Vec::new();
    if !report.compiled.is_empty() {
        lines.push("Compiled".to_string());
        lines.extend(report.compiled.iter().map(|p| format!("{}{p}", indent(1))));
    }
    if !report.skipped.is_empty() {
        lines.push("Up to date".to_string());
        lines.extend(report.skipped.iter().map(|p| format!("{}{p}", indent(1))));
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Compiled {}, {} up to date",
        plural(report.compiled.len(), "page"),
        report.skipped.len()
    ));
    lines
}

pub fn print_compile_output(report: &CompileReport) {
    for line in format_compile_output(report) {
        println!("{line}");
    }
}

pub fn format_info(info: &Map<String, Value>) -> Vec<String> {
    serde_json::to_string_pretty(info)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn print_info(info: &Map<String, Value>) {
    for line in format_info(info) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(compiled: &[&str], skipped: &[&str]) -> CompileReport {
        CompileReport {
            compiled: compiled.iter().map(|s| s.to_string()).collect(),
            skipped: skipped.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn compile_output_lists_both_groups() {
        let lines = format_compile_output(&report(&["home", "about"], &["contact"]));
        assert_eq!(
            lines,
            vec![
                "Compiled",
                "    home",
                "    about",
                "Up to date",
                "    contact",
                "",
                "Compiled 2 pages, 1 up to date",
            ]
        );
    }

    #[test]
    fn compile_output_nothing_configured() {
        let lines = format_compile_output(&report(&[], &[]));
        assert_eq!(lines, vec!["Compiled 0 pages, 0 up to date"]);
    }

    #[test]
    fn compile_output_singular_page() {
        let lines = format_compile_output(&report(&["home"], &[]));
        assert_eq!(lines.last().unwrap(), "Compiled 1 page, 0 up to date");
    }

    #[test]
    fn info_output_is_pretty_json() {
        let mut info = Map::new();
        info.insert("id".into(), Value::from("home"));
        info.insert("actual".into(), Value::from(true));
        assert_eq!(
            format_info(&info),
            vec!["{", "  \"actual\": true,", "  \"id\": \"home\"", "}"]
        );
    }
}

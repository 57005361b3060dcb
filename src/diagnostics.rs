//! Diagnostics extraction from raw build output
//!
//! Parses compiler-style lines of the shape
//! `<path>:<line>:<column>: <severity>: <message>` into structured records.
//! Anything that doesn't match is ignored; parsing never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warning")]
    Warning,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// A single structured build diagnostic. Line and column are 1-based as
/// reported by the compiler; malformed numbers fall back to 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    /// Stable signature used to spot the same diagnostic recurring across
    /// cycles. Column is excluded: fixes commonly shift it without changing
    /// the underlying problem.
    pub fn signature(&self) -> String {
        let prefix: String = self.message.chars().take(100).collect();
        format!("{}|{}|{}", self.file, self.line, prefix)
    }
}

fn diagnostic_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.+?):(\d+):(\d+):\s+(error|warning):\s+(.*)$")
            .expect("diagnostic pattern is valid")
    })
}

/// Parse raw build output into diagnostics, in document order.
///
/// Exact duplicates (same file, line, message) are de-duplicated keeping the
/// first occurrence. Unrecognized input yields an empty vec.
pub fn parse(raw: &str) -> Vec<Diagnostic> {
    let re = diagnostic_line_re();
    let mut seen: HashSet<(String, u32, String)> = HashSet::new();
    let mut out = Vec::new();

    for line in raw.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };

        let file = caps[1].to_string();
        // The regex only admits digits here, but oversized numbers still
        // fail to parse; keep the record with a 0 placeholder.
        let line_no: u32 = caps[2].parse().unwrap_or(0);
        let column: u32 = caps[3].parse().unwrap_or(0);
        let severity = match &caps[4] {
            "error" => Severity::Error,
            _ => Severity::Warning,
        };
        let message = caps[5].to_string();

        if !seen.insert((file.clone(), line_no, message.clone())) {
            continue;
        }

        out.push(Diagnostic {
            file,
            line: line_no,
            column,
            severity,
            message,
        });
    }

    out
}

/// Keep only error-severity diagnostics.
pub fn errors_only(diagnostics: &[Diagnostic]) -> Vec<Diagnostic> {
    diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .cloned()
        .collect()
}

/// Render diagnostics as a compact report, one line each.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "(no diagnostics)".to_string();
    }

    diagnostics
        .iter()
        .map(|d| {
            format!(
                "{}:{}:{}: {}: {}",
                d.file,
                d.line,
                d.column,
                d.severity.label(),
                d.message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_error_line() {
        let diags = parse("foo.swift:10:5: error: missing return");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].file, "foo.swift");
        assert_eq!(diags[0].line, 10);
        assert_eq!(diags[0].column, 5);
        assert_eq!(diags[0].severity, Severity::Error);
        assert_eq!(diags[0].message, "missing return");
    }

    #[test]
    fn test_parse_ignores_noise() {
        let raw = "Compiling mend v0.3.1\nnote: build finished\n   --> src/x.rs";
        assert!(parse(raw).is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_parse_mixed_severities_in_order() {
        let raw = "a.c:1:1: warning: unused variable\nb.c:2:3: error: expected ';'";
        let diags = parse(raw);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[1].severity, Severity::Error);
    }

    #[test]
    fn test_parse_dedupes_exact_repeats() {
        let raw = "m.rs:3:1: error: boom\nm.rs:3:1: error: boom\nm.rs:3:9: error: boom";
        // Third line has a different column but the same (file, line, message)
        // key, so it collapses too.
        let diags = parse(raw);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].column, 1);
    }

    #[test]
    fn test_parse_path_with_colons_in_message() {
        let diags = parse("src/main.rs:7:12: error: expected `:` found `;`");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "expected `:` found `;`");
    }

    #[test]
    fn test_parse_oversized_line_number_defaults_to_zero() {
        let raw = "big.rs:99999999999999999999:1: error: overflow in position";
        let diags = parse(raw);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].line, 0);
        assert_eq!(diags[0].message, "overflow in position");
    }

    #[test]
    fn test_errors_only_filters_warnings() {
        let raw = "a.c:1:1: warning: w\nb.c:2:2: error: e";
        let errs = errors_only(&parse(raw));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].message, "e");
    }

    #[test]
    fn test_format_diagnostics_round_trips_shape() {
        let raw = "foo.swift:10:5: error: missing return";
        let diags = parse(raw);
        assert_eq!(format_diagnostics(&diags), raw);
        assert_eq!(format_diagnostics(&[]), "(no diagnostics)");
    }

    #[test]
    fn test_signature_ignores_column() {
        let a = parse("x.rs:4:1: error: oops").remove(0);
        let b = parse("x.rs:4:9: error: oops").remove(0);
        assert_eq!(a.signature(), b.signature());
    }
}

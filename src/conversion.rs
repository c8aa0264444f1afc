//! Conversion of captured xmllint error output into diagnostics.
//!
//! xmllint reports each problem as three lines:
//!
//! ```text
//! forms/Rule/Rule.xml:3: parser error : Opening and ending tag mismatch: a line 1 and b
//! </b>
//!     ^
//! ```
//!
//! Blocks that do not have this shape are skipped.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info};

use crate::diagnostic::{DiagnosticRecord, Location};
use crate::error::{Result, ScanError};
use crate::rules::{RuleId, RuleRegistry, RuleSet};
use crate::validator::{ValidationResults, ValidationRun};

/// Cached regex for one xmllint error block
static ERROR_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_error_block_regex() -> &'static Regex {
    ERROR_BLOCK_REGEX.get_or_init(|| {
        Regex::new(
            r"(?m)^(?P<file>[^:\r\n]+):(?P<line>\d+):[ \t]*(?P<kind>[^:\r\n]*?)[ \t]*:[ \t]*(?P<message>[^\r\n]*)\r?\n[^\r\n]*\r?\n(?P<caret>[ \t]*)\^",
        )
        .expect("Failed to compile xmllint error block regex")
    })
}

/// Rule for an xmllint error type such as `parser error` or `namespace warning`
pub fn classify(kind: &str) -> RuleId {
    if kind.contains("parser error") {
        RuleId::XmllintParserError
    } else if kind.contains("validity error") {
        RuleId::XmllintValidityError
    } else {
        RuleId::XmllintError
    }
}

/// Extract every well-shaped error block from `text`, in input order.
pub fn parse_log(text: &str) -> Vec<DiagnosticRecord> {
    get_error_block_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let line: u32 = caps["line"].parse().ok()?;
            let column = caps["caret"].chars().count() as u32 + 1;
            let file = caps["file"].trim().replace('\\', "/");
            let kind = &caps["kind"];

            Some(DiagnosticRecord::new(
                classify(kind),
                caps["message"].trim_end().to_string(),
                Location::new(file, line, column),
            ))
        })
        .collect()
}

/// Read a captured xmllint log and convert it into a run for the report.
pub async fn convert_log(path: &Path) -> Result<ValidationRun> {
    let registry = RuleRegistry::load(RuleSet::Conversion)?;
    let started_at = Utc::now();

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ScanError::InputNotFound {
                path: path.to_path_buf(),
            }
        } else {
            ScanError::Io(e)
        }
    })?;
    let text = String::from_utf8_lossy(&bytes);

    let diagnostics = parse_log(&text);
    debug!(input = %path.display(), bytes = bytes.len(), "parsed xmllint log");

    let file_count = diagnostics
        .iter()
        .map(|d| d.location.file.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    let results = ValidationResults {
        total_files: file_count,
        files_with_findings: file_count,
        diagnostics,
        ..Default::default()
    };
    info!(
        input = %path.display(),
        diagnostics = results.diagnostics.len(),
        "converted xmllint log"
    );

    Ok(ValidationRun {
        registry,
        files: Vec::new(),
        script_count: 0,
        results,
        started_at,
        finished_at: Utc::now(),
    })
}

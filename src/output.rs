//! Human-readable run summary
//!
//! The SARIF log is the machine-readable result; this is what a person sees on stdout.

use std::path::Path;
use std::time::Duration;

use crate::cli::VerbosityLevel;
use crate::diagnostic::DiagnosticRecord;
use crate::rules::Severity;
use crate::validator::{FileValidationResult, ValidationRun, ValidationStatus};

/// Simple output formatter for human-readable results
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    /// Formatter that never emits color codes
    pub fn plain(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_colors: false,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_run(&self, run: &ValidationRun, report_path: &Path) -> String {
        let mut output = String::new();

        match self.verbosity {
            VerbosityLevel::Quiet => {
                if run.has_errors() {
                    output.push_str(&format!(
                        "Errors: {} Report: {}\n",
                        run.results.error_count(),
                        report_path.display()
                    ));
                }
            }
            VerbosityLevel::Normal | VerbosityLevel::Verbose | VerbosityLevel::Debug => {
                for diagnostic in run.diagnostics() {
                    output.push_str(&self.format_diagnostic(diagnostic));
                    output.push('\n');
                }
                if !run.diagnostics().is_empty() {
                    output.push('\n');
                }

                if self.verbosity >= VerbosityLevel::Verbose {
                    for file_result in &run.results.file_results {
                        if !file_result.status.is_clean() {
                            output.push_str(&self.format_file_result(file_result));
                            output.push('\n');
                        }
                    }
                }

                output.push_str(&self.format_summary(run, report_path));
            }
        }

        output
    }

    /// One line per finding: `file:line:column: level [RULE] message`
    pub fn format_diagnostic(&self, diagnostic: &DiagnosticRecord) -> String {
        let level = match diagnostic.severity {
            Severity::Error => self.colorize("error", "31"),
            Severity::Warning => self.colorize("warning", "33"),
            Severity::Note => self.colorize("note", "36"),
        };
        let location = &diagnostic.location;
        format!(
            "{}:{}:{}: {} [{}] {}",
            location.file,
            location.line,
            location.start_column,
            level,
            diagnostic.rule_id,
            diagnostic.message
        )
    }

    pub fn format_file_result(&self, result: &FileValidationResult) -> String {
        let duration_str = format_duration(result.duration);

        match &result.status {
            ValidationStatus::Clean => format!(
                "{}  {} ({})",
                self.colorize("✓ CLEAN", "32"),
                result.file,
                duration_str
            ),
            ValidationStatus::Findings { count } => format!(
                "{}  {} ({}) - {} finding{}",
                self.colorize("✗ FINDINGS", "31"),
                result.file,
                duration_str,
                count,
                if *count == 1 { "" } else { "s" }
            ),
            ValidationStatus::IoError { message } => format!(
                "{}  {} ({}) - {}",
                self.colorize("⚠ IO ERROR", "33"),
                result.file,
                duration_str,
                message
            ),
            ValidationStatus::Skipped { reason } => format!(
                "{}  {} - {}",
                self.colorize("- SKIPPED", "36"),
                result.file,
                reason
            ),
        }
    }

    fn format_summary(&self, run: &ValidationRun, report_path: &Path) -> String {
        let results = &run.results;
        let mut output = String::new();
        output.push_str(&format!("{}:\n", run.registry.rule_set().tool_name()));
        output.push_str(&format!("  Files: {}\n", results.total_files));

        if results.clean_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Clean:", "32"),
                results.clean_files
            ));
        }
        if results.files_with_findings > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("With findings:", "31"),
                results.files_with_findings
            ));
        }
        if results.io_error_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Unreadable:", "33"),
                results.io_error_files
            ));
        }
        if results.skipped_files > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Skipped:", "36"),
                results.skipped_files
            ));
        }
        output.push_str(&format!("  Diagnostics: {}\n", results.diagnostics.len()));

        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&format!("  Scripts indexed: {}\n", run.script_count));
            let elapsed = (run.finished_at - run.started_at)
                .to_std()
                .unwrap_or_default();
            output.push_str(&format!("  Duration: {}\n", format_duration(elapsed)));
        }

        if self.verbosity == VerbosityLevel::Debug {
            output.push_str(&format!(
                "  Validation time (sum over files): {}\n",
                format_duration(results.total_duration)
            ));
        }

        output.push_str(&format!("  Report: {}\n", report_path.display()));
        output
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}

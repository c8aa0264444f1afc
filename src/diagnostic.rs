//! Diagnostic records produced by validation and log conversion.

use serde::Serialize;

use crate::rules::{RuleId, Severity, default_severity};

/// Physical location of a finding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Root-relative file reference, forward slashes
    pub file: String,
    /// 1-based
    pub line: u32,
    /// 1-based
    pub start_column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, start_column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            start_column,
            end_column: None,
        }
    }

    pub fn with_end_column(mut self, end_column: u32) -> Self {
        self.end_column = Some(end_column);
        self
    }
}

/// One reported finding. Duplicates for the same rule and location are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRecord {
    pub rule_id: RuleId,
    pub message: String,
    pub severity: Severity,
    pub location: Location,
}

impl DiagnosticRecord {
    /// Record at the rule's default severity
    pub fn new(rule_id: RuleId, message: impl Into<String>, location: Location) -> Self {
        Self {
            rule_id,
            message: message.into(),
            severity: default_severity(rule_id),
            location,
        }
    }

    pub fn not_well_formed(location: Location, details: impl std::fmt::Display) -> Self {
        Self::new(
            RuleId::XmlNotWellFormed,
            format!("XML document is not well formed: {}", details),
            location,
        )
    }

    pub fn missing_script_attribute(location: Location, attribute: &str) -> Self {
        let message = format!("{} does not have {} defined.", location.file, attribute);
        Self::new(RuleId::MissingScriptAttribute, message, location)
    }

    pub fn missing_script_file(location: Location, attribute: &str, value: &str) -> Self {
        Self::new(
            RuleId::MissingScriptFile,
            format!(
                "{} references a script that does not exist: {}",
                attribute, value
            ),
            location,
        )
    }

    pub fn inconsistent_script_casing(
        location: Location,
        attribute: &str,
        value: &str,
        canonical: &str,
    ) -> Self {
        Self::new(
            RuleId::InconsistentScriptCasing,
            format!(
                "{} casing '{}' does not match target script's filename '{}'",
                attribute, value, canonical
            ),
            location,
        )
    }

    /// Task-fatal condition for a file; reported at the start of the file.
    pub fn io_error(file: impl Into<String>, details: impl std::fmt::Display) -> Self {
        let location = Location::new(file, 1, 1);
        let message = format!("Unable to read {}: {}", location.file, details);
        Self::new(RuleId::IoError, message, location)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

//! SARIF 2.1.0 diagnostics log
//!
//! Built from a completed [`ValidationRun`] and written only after every
//! validation task has joined. Nothing is written when building fails.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::diagnostic::DiagnosticRecord;
use crate::error::{Result, ScanError};
use crate::rules::{RuleDescriptor, RuleRegistry, Severity};
use crate::validator::ValidationRun;

pub const SARIF_SCHEMA: &str = "https://json.schemastore.org/sarif-2.1.0.json";
pub const SARIF_VERSION: &str = "2.1.0";

/// Default report location, relative to the working directory
pub const DEFAULT_REPORT_PATH: &str = "identity-governance.sarif";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarifLog {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRun {
    pub tool: Tool,
    pub automation_details: AutomationDetails,
    pub invocations: Vec<Invocation>,
    pub results: Vec<SarifResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub driver: ToolDriver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDriver {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub information_uri: Option<String>,
    pub rules: Vec<ReportingDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingDescriptor {
    pub id: String,
    pub name: String,
    pub short_description: Message,
    pub full_description: Message,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub help_uri: Option<String>,
    pub default_configuration: ReportingConfiguration,
}

impl From<&RuleDescriptor> for ReportingDescriptor {
    fn from(rule: &RuleDescriptor) -> Self {
        Self {
            id: rule.id.as_str().to_string(),
            name: rule.name.to_string(),
            short_description: Message::new(rule.short_description),
            full_description: Message::new(rule.full_description),
            help_uri: rule.help_uri.map(str::to_string),
            default_configuration: ReportingConfiguration {
                level: rule.default_severity,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingConfiguration {
    pub level: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationDetails {
    pub guid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub execution_successful: bool,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    pub rule_id: String,
    pub level: Severity,
    pub message: Message,
    pub locations: Vec<SarifLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifLocation {
    pub physical_location: PhysicalLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalLocation {
    pub artifact_location: ArtifactLocation,
    pub region: Region,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub start_line: u32,
    pub start_column: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_column: Option<u32>,
}

impl SarifResult {
    fn from_diagnostic(diagnostic: &DiagnosticRecord) -> Self {
        let location = &diagnostic.location;
        Self {
            rule_id: diagnostic.rule_id.as_str().to_string(),
            level: diagnostic.severity,
            message: Message::new(diagnostic.message.clone()),
            locations: vec![SarifLocation {
                physical_location: PhysicalLocation {
                    artifact_location: ArtifactLocation {
                        uri: location.file.clone(),
                    },
                    region: Region {
                        start_line: location.line,
                        start_column: location.start_column,
                        end_column: location.end_column,
                    },
                },
            }],
        }
    }
}

impl SarifLog {
    /// Build the log for a completed run.
    ///
    /// Fails if a diagnostic carries a rule id the run's registry does not describe.
    pub fn from_run(run: &ValidationRun) -> Result<Self> {
        let registry = &run.registry;
        check_rule_coverage(registry, run.diagnostics())?;

        let driver = ToolDriver {
            name: registry.rule_set().tool_name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            information_uri: option_env!("CARGO_PKG_REPOSITORY")
                .filter(|uri| !uri.is_empty())
                .map(str::to_string),
            rules: registry.rules().map(ReportingDescriptor::from).collect(),
        };

        let sarif_run = SarifRun {
            tool: Tool { driver },
            automation_details: AutomationDetails {
                guid: Uuid::new_v4(),
            },
            invocations: vec![Invocation {
                execution_successful: run.results.io_error_files == 0,
                start_time_utc: run.started_at,
                end_time_utc: run.finished_at,
            }],
            results: run
                .diagnostics()
                .iter()
                .map(SarifResult::from_diagnostic)
                .collect(),
        };

        Ok(Self {
            schema: SARIF_SCHEMA.to_string(),
            version: SARIF_VERSION.to_string(),
            runs: vec![sarif_run],
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize first, then write, so a failure leaves no partial file behind.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let mut json = self.to_json()?;
        json.push('\n');
        tokio::fs::write(path, json).await?;
        info!(
            report = %path.display(),
            results = self.runs.iter().map(|run| run.results.len()).sum::<usize>(),
            "wrote diagnostics log"
        );
        Ok(())
    }
}

fn check_rule_coverage(registry: &RuleRegistry, diagnostics: &[DiagnosticRecord]) -> Result<()> {
    match diagnostics
        .iter()
        .find(|diagnostic| registry.get(diagnostic.rule_id).is_none())
    {
        Some(diagnostic) => Err(ScanError::Configuration(format!(
            "rule {} is not registered for tool '{}'",
            diagnostic.rule_id,
            registry.rule_set().tool_name()
        ))),
        None => Ok(()),
    }
}

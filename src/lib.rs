//! # ig-scan Library
//!
//! Static analysis for identity-governance forms projects: XML well-formedness,
//! `Application` script references checked against the project's script files,
//! and conversion of captured xmllint output. Results are written as a SARIF 2.1.0
//! diagnostics log.

pub mod cli;
pub mod config;
pub mod conversion;
pub mod diagnostic;
pub mod error;
pub mod error_reporter;
pub mod file_discovery;
pub mod output;
pub mod report;
pub mod rules;
pub mod script_index;
pub mod validator;
pub mod xml_validator;

pub use cli::{Cli, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use conversion::{convert_log, parse_log};
pub use diagnostic::{DiagnosticRecord, Location};
pub use error::ScanError;
pub use error_reporter::ErrorReporter;
pub use file_discovery::{FileDiscovery, FileReference};
pub use output::Output;
pub use report::{DEFAULT_REPORT_PATH, SarifLog};
pub use rules::{RuleDescriptor, RuleId, RuleRegistry, RuleSet, Severity};
pub use script_index::{ScriptLookup, ScriptReferenceIndex};
pub use validator::{
    CancellationToken, FileValidationResult, ProgressCallback, ValidationConfig,
    ValidationEngine, ValidationPhase, ValidationProgress, ValidationResults, ValidationRun,
    ValidationStatus,
};
pub use xml_validator::{validate_file, validate_reader};

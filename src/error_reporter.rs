use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::error::ScanError;

/// Error reporter with configurable verbosity. Everything goes to stderr.
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
}

impl ErrorReporter {
    /// Create a new error reporter with specified verbosity
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
        }
    }

    /// Create a new error reporter with additional options
    pub fn with_options(verbosity: VerbosityLevel, show_timestamps: bool) -> Self {
        Self {
            verbosity,
            show_timestamps,
        }
    }

    /// Report a fatal scan error. Always printed, even in quiet mode.
    pub fn report_scan_error(&self, error: &ScanError) {
        eprintln!("{}", self.format_scan_error(error));
    }

    /// Report a configuration error
    pub fn report_config_error(&self, error: &ConfigError) {
        let formatted = match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!(
                    "Configuration Error: {}\n{}",
                    error,
                    self.get_config_help(error)
                )
            }
            VerbosityLevel::Debug => {
                format!(
                    "Configuration Error: {}\nDebug: {:?}\n{}",
                    error,
                    error,
                    self.get_config_help(error)
                )
            }
        };
        eprintln!("{}", formatted);
    }

    /// Report progress for long-running operations
    pub fn report_progress(&self, current: usize, total: usize, current_file: Option<&str>) {
        if self.verbosity == VerbosityLevel::Quiet || total == 0 {
            return;
        }

        let percentage = (current as f64 / total as f64 * 100.0) as u32;

        match (self.verbosity, current_file) {
            (VerbosityLevel::Verbose | VerbosityLevel::Debug, Some(file)) => {
                eprint!(
                    "\rProgress: {}/{} ({}%) - Validated: {}",
                    current, total, percentage, file
                );
            }
            _ => eprint!("\rProgress: {}/{} ({}%)", current, total, percentage),
        }

        if current == total {
            eprintln!(); // New line when complete
        }
    }

    pub fn format_scan_error(&self, error: &ScanError) -> String {
        match self.verbosity {
            VerbosityLevel::Quiet => format!("ERROR: {}", error),
            VerbosityLevel::Normal => self.format_error_normal(error),
            VerbosityLevel::Verbose => self.format_error_verbose(error),
            VerbosityLevel::Debug => self.format_error_debug(error),
        }
    }

    /// Format error for normal output
    fn format_error_normal(&self, error: &ScanError) -> String {
        let timestamp = if self.show_timestamps {
            format!("[{}] ", chrono::Utc::now().format("%H:%M:%S"))
        } else {
            String::new()
        };

        format!("{}{}", timestamp, error)
    }

    /// Format error for verbose output
    fn format_error_verbose(&self, error: &ScanError) -> String {
        let mut output = self.format_error_normal(error);

        match error {
            ScanError::Discovery { path, .. } => {
                output.push_str(&format!(
                    "\nSuggestion: Check that {} is a readable directory or pass --root",
                    path.display()
                ));
            }
            ScanError::InputNotFound { path } => {
                output.push_str(&format!(
                    "\nSuggestion: Capture xmllint output first, e.g. xmllint --noout *.xml 2> {}",
                    path.display()
                ));
            }
            ScanError::Report(_) | ScanError::Io(_) => {
                output.push_str("\nSuggestion: Check that the report location is writable");
            }
            _ => {}
        }

        output
    }

    /// Format error for debug output
    fn format_error_debug(&self, error: &ScanError) -> String {
        let mut output = self.format_error_verbose(error);
        output.push_str(&format!("\nDebug Info: {:?}", error));

        output.push_str("\nError Chain:");
        let mut current_error: &dyn std::error::Error = error;
        let mut level = 0;
        while let Some(source) = current_error.source() {
            output.push_str(&format!("\n  {}: {}", level + 1, source));
            current_error = source;
            level += 1;
        }

        output
    }

    /// Get helpful suggestions for configuration errors
    fn get_config_help(&self, error: &ConfigError) -> String {
        match error {
            ConfigError::Io(_) => {
                "Check that the configuration file exists and is readable".to_string()
            }
            ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
                "Check the configuration file syntax (TOML/JSON format expected)".to_string()
            }
            ConfigError::UnsupportedFormat(_) => {
                "Use a .toml or .json configuration file".to_string()
            }
            ConfigError::Environment(_) => {
                "Fix or unset the IG_SCAN_* environment variable".to_string()
            }
            ConfigError::Validation(_) => {
                "Resolve conflicting values between file, environment, and CLI".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_reporter_verbosity_levels() {
        let reporter_quiet = ErrorReporter::new(VerbosityLevel::Quiet);
        let reporter_debug = ErrorReporter::with_options(VerbosityLevel::Debug, true);

        assert_eq!(reporter_quiet.verbosity, VerbosityLevel::Quiet);
        assert_eq!(reporter_debug.verbosity, VerbosityLevel::Debug);
        assert!(reporter_debug.show_timestamps);
    }

    #[test]
    fn test_quiet_format_is_one_line() {
        let reporter = ErrorReporter::new(VerbosityLevel::Quiet);
        let error = ScanError::InputNotFound {
            path: PathBuf::from("xmllint.log"),
        };
        let formatted = reporter.format_scan_error(&error);
        assert!(formatted.starts_with("ERROR: "));
        assert!(!formatted.contains('\n'));
    }

    #[test]
    fn test_verbose_format_adds_suggestion() {
        let reporter = ErrorReporter::new(VerbosityLevel::Verbose);
        let error = ScanError::Discovery {
            path: PathBuf::from("/forms"),
            reason: "No such file or directory".to_string(),
        };
        let formatted = reporter.format_scan_error(&error);
        assert!(formatted.contains("Cannot scan /forms"));
        assert!(formatted.contains("--root"));
    }

    #[test]
    fn test_debug_format_includes_error_chain() {
        let reporter = ErrorReporter::new(VerbosityLevel::Debug);
        let error = ScanError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        ));
        let formatted = reporter.format_scan_error(&error);
        assert!(formatted.contains("Error Chain:"));
        assert!(formatted.contains("1: read-only file system"));
    }
}

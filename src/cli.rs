use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show critical errors
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// Static analysis of an identity-governance forms project
#[derive(Parser, Debug, Clone)]
#[command(name = "ig-scan")]
#[command(
    about = "Check XML well-formedness and Application script references, writing a SARIF diagnostics log"
)]
#[command(version)]
pub struct Cli {
    /// Captured xmllint error output to convert instead of scanning
    #[arg(value_name = "ERROR_LOG")]
    pub error_log: Option<PathBuf>,

    /// Root of the forms project
    #[arg(short = 'r', long = "root", default_value = ".")]
    pub root: PathBuf,

    /// Where to write the diagnostics log
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Number of files validated concurrently
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// XML file extensions (comma-separated)
    #[arg(long = "xml-extensions", help = "XML file extensions (e.g., 'xml,XML')")]
    pub xml_extensions: Option<String>,

    /// Script file extensions (comma-separated)
    #[arg(long = "script-extensions", help = "Script file extensions (e.g., 'bsh')")]
    pub script_extensions: Option<String>,

    /// Exclude file patterns (glob syntax, relative to the root)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Follow symbolic links while discovering files
    #[arg(long = "follow-symlinks")]
    pub follow_symlinks: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with_all = ["verbose", "debug"]
    )]
    pub quiet: bool,

    /// Log every file as it is validated
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn get_xml_extensions(&self) -> Option<Vec<String>> {
        self.xml_extensions.as_deref().map(split_list)
    }

    pub fn get_script_extensions(&self) -> Option<Vec<String>> {
        self.script_extensions.as_deref().map(split_list)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.debug {
            VerbosityLevel::Debug
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Split a comma-separated list, dropping empty entries
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_mode_defaults() {
        let cli = Cli::try_parse_from(["ig-scan"]).unwrap();
        assert_eq!(cli.error_log, None);
        assert_eq!(cli.root, PathBuf::from("."));
        assert_eq!(cli.output, None);
        assert_eq!(cli.get_xml_extensions(), None);
        assert_eq!(cli.verbosity(), VerbosityLevel::Normal);
    }

    #[test]
    fn test_conversion_mode_positional() {
        let cli = Cli::try_parse_from(["ig-scan", "xmllint.log", "-o", "out.sarif"]).unwrap();
        assert_eq!(cli.error_log, Some(PathBuf::from("xmllint.log")));
        assert_eq!(cli.output, Some(PathBuf::from("out.sarif")));
    }

    #[test]
    fn test_discovery_options() {
        let cli = Cli::try_parse_from([
            "ig-scan",
            "--root",
            "/forms",
            "--xml-extensions",
            "xml, xhtml",
            "--script-extensions",
            "bsh",
            "--exclude",
            "build/**",
            "--exclude",
            "**/*.bak.xml",
            "--follow-symlinks",
            "--threads",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.root, PathBuf::from("/forms"));
        assert_eq!(
            cli.get_xml_extensions(),
            Some(vec!["xml".to_string(), "xhtml".to_string()])
        );
        assert_eq!(cli.get_script_extensions(), Some(vec!["bsh".to_string()]));
        assert_eq!(cli.exclude_patterns.len(), 2);
        assert!(cli.follow_symlinks);
        assert_eq!(cli.threads, Some(4));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let cli = Cli::try_parse_from(["ig-scan", "--threads", "0"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["ig-scan", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        let cli = Cli::try_parse_from(["ig-scan", "-q"]).unwrap();
        assert_eq!(cli.verbosity(), VerbosityLevel::Quiet);
        let cli = Cli::try_parse_from(["ig-scan", "-v"]).unwrap();
        assert_eq!(cli.verbosity(), VerbosityLevel::Verbose);
        let cli = Cli::try_parse_from(["ig-scan", "--debug"]).unwrap();
        assert_eq!(cli.verbosity(), VerbosityLevel::Debug);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a,,b ,"), vec!["a".to_string(), "b".to_string()]);
        assert!(split_list("").is_empty());
    }
}

use crate::cli::{Cli, VerbosityLevel, split_list};
use crate::file_discovery::FileDiscovery;
use crate::report::DEFAULT_REPORT_PATH;
use crate::validator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
}

/// File discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Extensions of documents to validate
    pub xml_extensions: Vec<String>,
    /// Extensions of script files that Application attributes may reference
    pub script_extensions: Vec<String>,
    /// Exclude patterns (glob syntax, root-relative)
    pub exclude_patterns: Vec<String>,
    /// Follow symbolic links
    pub follow_symlinks: bool,
}

/// Validation-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of concurrent validation threads
    pub threads: Option<usize>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Diagnostics log path
    pub report: PathBuf,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            xml_extensions: vec!["xml".to_string()],
            script_extensions: vec!["bsh".to_string()],
            exclude_patterns: vec![],
            follow_symlinks: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report: PathBuf::from(DEFAULT_REPORT_PATH),
            verbose: false,
            quiet: false,
        }
    }
}

impl Config {
    /// Discovery of the documents to validate
    pub fn xml_discovery(&self) -> crate::error::Result<FileDiscovery> {
        self.discovery(&self.scan.xml_extensions)
    }

    /// Discovery of the scripts that make up the reference index
    pub fn script_discovery(&self) -> crate::error::Result<FileDiscovery> {
        self.discovery(&self.scan.script_extensions)
    }

    fn discovery(&self, extensions: &[String]) -> crate::error::Result<FileDiscovery> {
        FileDiscovery::new()
            .with_extensions(extensions.to_vec())
            .with_follow_symlinks(self.scan.follow_symlinks)
            .with_exclude_patterns(self.scan.exclude_patterns.clone())
    }

    pub fn engine_config(&self) -> validator::ValidationConfig {
        validator::ValidationConfig {
            max_concurrent_validations: ConfigManager::get_thread_count(self),
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.output.quiet {
            VerbosityLevel::Quiet
        } else if self.output.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    const CONFIG_NAMES: [&'static str; 4] = [
        "ig-scan.toml",
        "ig-scan.json",
        ".ig-scan.toml",
        ".ig-scan.json",
    ];

    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli).await
    }

    /// Load configuration reading environment variables from `env`
    pub async fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        // Load from configuration file if specified
        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file(&cli.root).await? {
            config = Self::merge_configs(config, found_config);
        }

        // Apply environment variable overrides
        config = Self::apply_environment_overrides_with(env, config)?;

        // Apply CLI argument overrides (highest precedence)
        config = Self::merge_with_cli(config, cli);

        // Validate the final configuration
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        debug!(config = %path.display(), "loading configuration file");

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                let config: Config = toml::from_str(&content)?;
                Ok(config)
            }
            Some("json") => {
                let config: Config = serde_json::from_str(&content)?;
                Ok(config)
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    let config: Config = serde_json::from_str(&content)?;
                    Ok(config)
                }
            }
        }
    }

    /// Find configuration file in the scan root, then the user config directory
    pub async fn find_config_file(root: &Path) -> Result<Option<Config>> {
        let user_dir = dirs::config_dir().map(|dir| dir.join("ig-scan"));
        Self::find_config_file_in(root, user_dir.as_deref()).await
    }

    async fn find_config_file_in(root: &Path, user_dir: Option<&Path>) -> Result<Option<Config>> {
        for dir in std::iter::once(root).chain(user_dir) {
            for name in &Self::CONFIG_NAMES {
                let path = dir.join(name);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(threads) = env.get("IG_SCAN_THREADS") {
            config.validation.threads = Some(threads.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid IG_SCAN_THREADS value: {}", threads))
            })?);
        }

        if let Some(extensions) = env.get("IG_SCAN_XML_EXTENSIONS") {
            config.scan.xml_extensions = split_list(&extensions);
        }

        if let Some(extensions) = env.get("IG_SCAN_SCRIPT_EXTENSIONS") {
            config.scan.script_extensions = split_list(&extensions);
        }

        if let Some(follow) = env.get("IG_SCAN_FOLLOW_SYMLINKS") {
            config.scan.follow_symlinks = parse_bool("IG_SCAN_FOLLOW_SYMLINKS", &follow)?;
        }

        if let Some(report) = env.get("IG_SCAN_OUTPUT") {
            config.output.report = PathBuf::from(report);
        }

        if let Some(verbose) = env.get("IG_SCAN_VERBOSE") {
            config.output.verbose = parse_bool("IG_SCAN_VERBOSE", &verbose)?;
        }

        if let Some(quiet) = env.get("IG_SCAN_QUIET") {
            config.output.quiet = parse_bool("IG_SCAN_QUIET", &quiet)?;
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if cli.threads.is_some() {
            config.validation.threads = cli.threads;
        }

        if let Some(extensions) = cli.get_xml_extensions() {
            config.scan.xml_extensions = extensions;
        }
        if let Some(extensions) = cli.get_script_extensions() {
            config.scan.script_extensions = extensions;
        }
        if !cli.exclude_patterns.is_empty() {
            config.scan.exclude_patterns = cli.exclude_patterns.clone();
        }
        if cli.follow_symlinks {
            config.scan.follow_symlinks = true;
        }

        if let Some(output) = &cli.output {
            config.output.report = output.clone();
        }
        // The command line picks one verbosity; it replaces whatever the file chose.
        if cli.verbose || cli.debug {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Merge two configurations (second takes precedence for non-default values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        if override_config.validation.threads.is_some() {
            base.validation.threads = override_config.validation.threads;
        }

        if !override_config.scan.xml_extensions.is_empty() {
            base.scan.xml_extensions = override_config.scan.xml_extensions;
        }
        if !override_config.scan.script_extensions.is_empty() {
            base.scan.script_extensions = override_config.scan.script_extensions;
        }
        if !override_config.scan.exclude_patterns.is_empty() {
            base.scan.exclude_patterns = override_config.scan.exclude_patterns;
        }
        base.scan.follow_symlinks = override_config.scan.follow_symlinks;

        base.output.report = override_config.output.report;
        base.output.verbose = override_config.output.verbose;
        base.output.quiet = override_config.output.quiet;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        // Validate threads
        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        // Validate output settings
        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }
        if config.output.report.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Report path must not be empty".to_string(),
            ));
        }

        // Validate file settings
        for (kind, extensions) in [
            ("XML", &config.scan.xml_extensions),
            ("script", &config.scan.script_extensions),
        ] {
            if extensions.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "At least one {} file extension must be specified",
                    kind
                )));
            }

            // Validate that extensions don't contain invalid characters
            for ext in extensions {
                if ext.contains('/')
                    || ext.contains('\\')
                    || ext.trim_start_matches('.').contains('.')
                {
                    return Err(ConfigError::Validation(format!(
                        "Invalid file extension: {}",
                        ext
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get the effective thread count
    pub fn get_thread_count(config: &Config) -> usize {
        config.validation.threads.unwrap_or_else(num_cpus::get)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.validation.threads, None);
        assert_eq!(config.scan.xml_extensions, vec!["xml"]);
        assert_eq!(config.scan.script_extensions, vec!["bsh"]);
        assert!(config.scan.exclude_patterns.is_empty());
        assert!(!config.scan.follow_symlinks);
        assert_eq!(config.output.report, PathBuf::from("identity-governance.sarif"));
        assert!(!config.output.verbose);
        assert!(!config.output.quiet);
        assert_eq!(config.verbosity(), VerbosityLevel::Normal);
    }

    #[tokio::test]
    async fn test_load_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let toml_content = r#"
[scan]
xml_extensions = ["xml", "xhtml"]
script_extensions = ["bsh"]
exclude_patterns = ["build/**"]
follow_symlinks = true

[validation]
threads = 8

[output]
report = "reports/forms.sarif"
verbose = true
"#;

        fs::write(&config_path, toml_content).unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();

        assert_eq!(config.scan.xml_extensions, vec!["xml", "xhtml"]);
        assert_eq!(config.scan.exclude_patterns, vec!["build/**"]);
        assert!(config.scan.follow_symlinks);
        assert_eq!(config.validation.threads, Some(8));
        assert_eq!(config.output.report, PathBuf::from("reports/forms.sarif"));
        assert!(config.output.verbose);
        assert!(!config.output.quiet);
    }

    #[tokio::test]
    async fn test_load_partial_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        fs::write(&config_path, r#"{ "validation": { "threads": 4 } }"#).unwrap();

        let config = ConfigManager::load_from_file(&config_path).await.unwrap();

        assert_eq!(config.validation.threads, Some(4));
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(config.output, OutputConfig::default());
    }

    #[tokio::test]
    async fn test_unsupported_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(&config_path, "invalid: yaml").unwrap();

        match ConfigManager::load_from_file(&config_path).await.unwrap_err() {
            ConfigError::UnsupportedFormat(ext) => assert_eq!(ext, "yaml"),
            other => panic!("Expected UnsupportedFormat error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid toml [[[").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParsing(_)));
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        fs::write(&config_path, "{ invalid json }").unwrap();

        let result = ConfigManager::load_from_file(&config_path).await;
        assert!(matches!(result.unwrap_err(), ConfigError::JsonParsing(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let mut mock_env = MockEnvProvider::new();
        mock_env.set("IG_SCAN_THREADS", "16");
        mock_env.set("IG_SCAN_XML_EXTENSIONS", "xml,xhtml");
        mock_env.set("IG_SCAN_SCRIPT_EXTENSIONS", "bsh,beanshell");
        mock_env.set("IG_SCAN_FOLLOW_SYMLINKS", "true");
        mock_env.set("IG_SCAN_OUTPUT", "/tmp/scan.sarif");
        mock_env.set("IG_SCAN_VERBOSE", "true");

        let config =
            ConfigManager::apply_environment_overrides_with(&mock_env, Config::default()).unwrap();

        assert_eq!(config.validation.threads, Some(16));
        assert_eq!(config.scan.xml_extensions, vec!["xml", "xhtml"]);
        assert_eq!(config.scan.script_extensions, vec!["bsh", "beanshell"]);
        assert!(config.scan.follow_symlinks);
        assert_eq!(config.output.report, PathBuf::from("/tmp/scan.sarif"));
        assert!(config.output.verbose);
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut mock_env = MockEnvProvider::new();
        mock_env.set("IG_SCAN_THREADS", "invalid");

        let result = ConfigManager::apply_environment_overrides_with(&mock_env, Config::default());
        assert!(matches!(result.unwrap_err(), ConfigError::Environment(_)));

        let mut mock_env = MockEnvProvider::new();
        mock_env.set("IG_SCAN_QUIET", "yes please");
        let result = ConfigManager::apply_environment_overrides_with(&mock_env, Config::default());
        assert!(matches!(result.unwrap_err(), ConfigError::Environment(_)));
    }

    #[test]
    fn test_merge_with_cli() {
        let cli = Cli::try_parse_from([
            "ig-scan",
            "--threads",
            "12",
            "--verbose",
            "--xml-extensions",
            "xml,xhtml",
            "--exclude",
            "tmp/**",
            "-o",
            "out.sarif",
        ])
        .unwrap();

        let mut base = Config::default();
        base.output.quiet = true;
        let config = ConfigManager::merge_with_cli(base, &cli);

        assert_eq!(config.validation.threads, Some(12));
        assert!(config.output.verbose);
        assert!(!config.output.quiet);
        assert_eq!(config.scan.xml_extensions, vec!["xml", "xhtml"]);
        assert_eq!(config.scan.script_extensions, vec!["bsh"]);
        assert_eq!(config.scan.exclude_patterns, vec!["tmp/**"]);
        assert_eq!(config.output.report, PathBuf::from("out.sarif"));
    }

    #[test]
    fn test_cli_without_flags_keeps_file_values() {
        let cli = Cli::try_parse_from(["ig-scan"]).unwrap();

        let mut base = Config::default();
        base.validation.threads = Some(3);
        base.scan.script_extensions = vec!["beanshell".to_string()];
        let config = ConfigManager::merge_with_cli(base.clone(), &cli);

        assert_eq!(config, base);
    }

    #[test]
    fn test_merge_configs() {
        let mut base = Config::default();
        base.validation.threads = Some(4);

        let mut override_config = Config::default();
        override_config.validation.threads = Some(8);
        override_config.scan.exclude_patterns = vec!["*.bak".to_string()];

        let merged = ConfigManager::merge_configs(base, override_config);

        assert_eq!(merged.validation.threads, Some(8));
        assert_eq!(merged.scan.exclude_patterns, vec!["*.bak"]);
        assert_eq!(merged.scan.xml_extensions, vec!["xml"]);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        config.validation.threads = Some(0);
        assert!(ConfigManager::validate_config(&config).is_err());

        config.validation.threads = Some(1001);
        assert!(ConfigManager::validate_config(&config).is_err());

        config.validation.threads = Some(4);

        config.output.verbose = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());

        config.output.verbose = false;
        config.output.quiet = false;

        config.scan.script_extensions = vec![];
        assert!(ConfigManager::validate_config(&config).is_err());

        config.scan.script_extensions = vec![".bsh".to_string()];
        assert!(ConfigManager::validate_config(&config).is_ok());

        config.scan.xml_extensions = vec!["invalid/ext".to_string()];
        assert!(ConfigManager::validate_config(&config).is_err());
    }

    #[test]
    fn test_engine_config_uses_threads() {
        let mut config = Config::default();
        assert!(config.engine_config().max_concurrent_validations >= 1);

        config.validation.threads = Some(3);
        assert_eq!(config.engine_config().max_concurrent_validations, 3);
    }

    #[tokio::test]
    async fn test_find_config_file_in_root() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(".ig-scan.toml"),
            "[validation]\nthreads = 2\n",
        )
        .unwrap();

        let config = ConfigManager::find_config_file_in(temp_dir.path(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.validation.threads, Some(2));
    }

    #[tokio::test]
    async fn test_find_config_file_falls_back_to_user_dir() {
        let root = TempDir::new().unwrap();
        let user_dir = TempDir::new().unwrap();
        fs::write(
            user_dir.path().join("ig-scan.json"),
            r#"{ "output": { "quiet": true } }"#,
        )
        .unwrap();

        let config = ConfigManager::find_config_file_in(root.path(), Some(user_dir.path()))
            .await
            .unwrap()
            .unwrap();
        assert!(config.output.quiet);

        let none = ConfigManager::find_config_file_in(root.path(), None)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_load_config_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("scan.toml");
        fs::write(
            &config_path,
            r#"
[validation]
threads = 6

[scan]
script_extensions = ["beanshell"]

[output]
report = "file.sarif"
"#,
        )
        .unwrap();

        let mut mock_env = MockEnvProvider::new();
        mock_env.set("IG_SCAN_OUTPUT", "env.sarif");
        mock_env.set("IG_SCAN_THREADS", "5");

        let cli = Cli::try_parse_from([
            "ig-scan",
            "--config",
            config_path.to_str().unwrap(),
            "--threads",
            "2",
        ])
        .unwrap();

        let config = ConfigManager::load_config_with(&mock_env, &cli).await.unwrap();

        assert_eq!(config.validation.threads, Some(2));
        assert_eq!(config.scan.script_extensions, vec!["beanshell"]);
        assert_eq!(config.output.report, PathBuf::from("env.sarif"));
    }
}

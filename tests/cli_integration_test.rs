mod common;

use std::path::Path;
use std::process::{Command, Output};

use common::*;
use tempfile::TempDir;

/// The built binary, isolated from the caller's environment and user configuration
fn ig_scan(working_dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_ig-scan"));
    command
        .current_dir(working_dir)
        .env("XDG_CONFIG_HOME", working_dir.join(".no-user-config"))
        .env_remove("RUST_LOG");
    for key in [
        "IG_SCAN_THREADS",
        "IG_SCAN_XML_EXTENSIONS",
        "IG_SCAN_SCRIPT_EXTENSIONS",
        "IG_SCAN_OUTPUT",
        "IG_SCAN_FOLLOW_SYMLINKS",
        "IG_SCAN_VERBOSE",
        "IG_SCAN_QUIET",
    ] {
        command.env_remove(key);
    }
    command
}

fn read_report(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_cli_help_output() {
    let temp_dir = TempDir::new().unwrap();
    let output = ig_scan(temp_dir.path()).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("--root"));
    assert!(stdout.contains("--output"));
    assert!(stdout.contains("--threads"));
    assert!(stdout.contains("[ERROR_LOG]"));
}

#[tokio::test]
async fn test_scan_writes_default_report_in_working_directory() {
    let project = FormsProject::new();
    project.script("Pre.bsh").await;
    project.script("Post.bsh").await;
    project.script("Prov.bsh").await;
    project
        .write(
            "Application/Ldap.xml",
            &complete_application_xml("Pre.bsh", "Post.bsh", "Prov.bsh"),
        )
        .await;

    let output = ig_scan(project.root()).output().unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let report = read_report(&project.root().join("identity-governance.sarif"));
    assert_eq!(
        report["$schema"],
        "https://json.schemastore.org/sarif-2.1.0.json"
    );
    assert_eq!(report["runs"][0]["tool"]["driver"]["name"], "Xml Validation");
    assert!(report["runs"][0]["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_findings_exit_with_one() {
    let project = FormsProject::new();
    project
        .write("Application/Ldap.xml", &application_xml(r#"preScript="Pre.bsh""#))
        .await;
    let out_dir = TempDir::new().unwrap();
    let report_path = out_dir.path().join("scan.sarif");

    let output = ig_scan(out_dir.path())
        .arg("--root")
        .arg(project.root())
        .arg("--output")
        .arg(&report_path)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Application/Ldap.xml:3:1: error [MISSING-SCRIPT-FILE]"));

    let report = read_report(&report_path);
    let results = report["runs"][0]["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["ruleId"], "MISSING-SCRIPT-FILE");
    assert_eq!(results[1]["ruleId"], "MISSING-SCRIPT-ATTRIBUTE");
}

#[test]
fn test_missing_root_is_fatal_and_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();

    let output = ig_scan(temp_dir.path())
        .args(["--root", "/nonexistent/forms/project"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("/nonexistent/forms/project"));
    assert!(!temp_dir.path().join("identity-governance.sarif").exists());
}

#[test]
fn test_conversion_of_missing_log_is_fatal() {
    let temp_dir = TempDir::new().unwrap();

    let output = ig_scan(temp_dir.path()).arg("missing.log").output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Input file not found"));
    assert!(!temp_dir.path().join("identity-governance.sarif").exists());
}

#[test]
fn test_conversion_of_xmllint_log() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("xmllint.log"),
        "forms/Rule.xml:4: parser error : Premature end of data in tag Rule line 1\n\n^\nnoise\n",
    )
    .unwrap();

    let output = ig_scan(temp_dir.path()).arg("xmllint.log").output().unwrap();

    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
    let report = read_report(&temp_dir.path().join("identity-governance.sarif"));
    assert_eq!(report["runs"][0]["tool"]["driver"]["name"], "xmllint");
    let results = report["runs"][0]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["ruleId"], "XMLLINT-PARSER-ERROR");
}

#[tokio::test]
async fn test_project_config_file_is_used() {
    let project = FormsProject::new();
    project.write("Application/Ldap.xml", "<Application>").await;
    project
        .write(
            ".ig-scan.toml",
            "[scan]\nexclude_patterns = [\"Application/**\"]\n\n[output]\nreport = \"configured.sarif\"\n",
        )
        .await;

    let output = ig_scan(project.root()).output().unwrap();

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(project.root().join("configured.sarif").exists());
    assert!(!project.root().join("identity-governance.sarif").exists());
}

#[test]
fn test_zero_threads_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let output = ig_scan(temp_dir.path()).args(["--threads", "0"]).output().unwrap();

    assert_eq!(output.status.code(), Some(2));
}

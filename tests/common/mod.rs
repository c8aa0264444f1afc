//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ig_scan::{FileDiscovery, ValidationConfig, ValidationEngine, ValidationRun};
use tempfile::TempDir;
use tokio::fs;

pub const APPLICATION_PROLOG: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<!DOCTYPE Application PUBLIC "sailpoint.dtd" "sailpoint.dtd">
"#;

/// `Application` document with the given attribute text on line 3, column 1
pub fn application_xml(attributes: &str) -> String {
    format!(
        "{APPLICATION_PROLOG}<Application name=\"LDAP\" {attributes}>\n  <Attributes/>\n</Application>\n"
    )
}

/// `Application` document referencing all three scripts
pub fn complete_application_xml(pre: &str, post: &str, provisioning: &str) -> String {
    application_xml(&format!(
        r#"preScript="{pre}" postScript="{post}" provisioningScript="{provisioning}""#
    ))
}

pub const RULE_XML: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<!DOCTYPE Rule PUBLIC "sailpoint.dtd" "sailpoint.dtd">
<Rule name="Build Map" language="beanshell">
  <Source><![CDATA[ return map; ]]></Source>
</Rule>
"#;

/// A forms project laid out in a temporary directory
pub struct FormsProject {
    dir: TempDir,
}

impl FormsProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub async fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(&path, content).await.unwrap();
        path
    }

    pub async fn script(&self, relative: &str) -> PathBuf {
        self.write(relative, "return;\n").await
    }

    pub async fn scan(&self, threads: usize) -> ValidationRun {
        scan(self.root(), threads).await
    }
}

pub fn xml_discovery() -> FileDiscovery {
    FileDiscovery::new()
}

pub fn script_discovery() -> FileDiscovery {
    FileDiscovery::new().with_extensions(vec!["bsh".to_string()])
}

pub async fn scan(root: &Path, threads: usize) -> ValidationRun {
    ValidationEngine::new(ValidationConfig {
        max_concurrent_validations: threads,
    })
    .unwrap()
    .scan(root, &xml_discovery(), &script_discovery())
    .await
    .unwrap()
}

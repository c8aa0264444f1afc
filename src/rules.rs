//! Rule Registry
//!
//! The fixed catalog of diagnostic rules. Every [`RuleId`] a producer can emit
//! must have a [`RuleDescriptor`] in the registry handed to the report; the
//! check runs once at startup through [`RuleRegistry::verify`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Where a rule applies and which tool reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSet {
    /// Recursive scan of the forms tree
    Scan,
    /// Conversion of captured xmllint output
    Conversion,
}

impl RuleSet {
    /// Tool name shown in the diagnostics log
    pub fn tool_name(&self) -> &'static str {
        match self {
            RuleSet::Scan => "Xml Validation",
            RuleSet::Conversion => "xmllint",
        }
    }

    /// Rule ids the producer of this set can emit.
    pub fn emitted_rules(&self) -> &'static [RuleId] {
        match self {
            RuleSet::Scan => &[
                RuleId::XmlNotWellFormed,
                RuleId::MissingScriptAttribute,
                RuleId::MissingScriptFile,
                RuleId::InconsistentScriptCasing,
                RuleId::IoError,
            ],
            RuleSet::Conversion => &[
                RuleId::XmllintParserError,
                RuleId::XmllintValidityError,
                RuleId::XmllintError,
            ],
        }
    }
}

/// Identifier of a diagnostic rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleId {
    XmlNotWellFormed,
    MissingScriptAttribute,
    MissingScriptFile,
    InconsistentScriptCasing,
    IoError,
    XmllintParserError,
    XmllintValidityError,
    XmllintError,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::XmlNotWellFormed => "XML-NOT-WELL-FORMED",
            RuleId::MissingScriptAttribute => "MISSING-SCRIPT-ATTRIBUTE",
            RuleId::MissingScriptFile => "MISSING-SCRIPT-FILE",
            RuleId::InconsistentScriptCasing => "INCONSISTENT-SCRIPT-CASING",
            RuleId::IoError => "IO-ERROR",
            RuleId::XmllintParserError => "XMLLINT-PARSER-ERROR",
            RuleId::XmllintValidityError => "XMLLINT-VALIDITY-ERROR",
            RuleId::XmllintError => "XMLLINT-ERROR",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RuleId {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Diagnostic severity, serialized as a SARIF level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata for one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDescriptor {
    pub id: RuleId,
    pub name: &'static str,
    pub short_description: &'static str,
    pub full_description: &'static str,
    pub help_uri: Option<&'static str>,
    pub default_severity: Severity,
}

const XMLLINT_HELP: &str = "https://gnome.pages.gitlab.gnome.org/libxml2/xmllint.html";

static DESCRIPTORS: &[RuleDescriptor] = &[
    RuleDescriptor {
        id: RuleId::XmlNotWellFormed,
        name: "InvalidXml",
        short_description: "Invalid XML",
        full_description: "XML document is not well formed or valid",
        help_uri: Some("https://www.w3.org/TR/xml/#sec-well-formed"),
        default_severity: Severity::Error,
    },
    RuleDescriptor {
        id: RuleId::MissingScriptAttribute,
        name: "MissingScriptAttribute",
        short_description: "Application script attribute missing",
        full_description: "Every Application element must define preScript, postScript and provisioningScript",
        help_uri: None,
        default_severity: Severity::Error,
    },
    RuleDescriptor {
        id: RuleId::MissingScriptFile,
        name: "MissingScriptFile",
        short_description: "Referenced script does not exist",
        full_description: "An Application script attribute names a script file that is not present in the project",
        help_uri: None,
        default_severity: Severity::Error,
    },
    RuleDescriptor {
        id: RuleId::InconsistentScriptCasing,
        name: "InconsistentScriptCasing",
        short_description: "Script reference casing differs from file name",
        full_description: "An Application script attribute matches a script file only when case is ignored; file systems that are case-sensitive will not find it",
        help_uri: None,
        default_severity: Severity::Error,
    },
    RuleDescriptor {
        id: RuleId::IoError,
        name: "UnreadableFile",
        short_description: "File could not be read",
        full_description: "The file was discovered but could not be read during validation",
        help_uri: None,
        default_severity: Severity::Error,
    },
    RuleDescriptor {
        id: RuleId::XmllintParserError,
        name: "ParserError",
        short_description: "xmllint parser error",
        full_description: "xmllint reported that the document is not well formed",
        help_uri: Some(XMLLINT_HELP),
        default_severity: Severity::Error,
    },
    RuleDescriptor {
        id: RuleId::XmllintValidityError,
        name: "ValidityError",
        short_description: "xmllint validity error",
        full_description: "xmllint reported that the document does not conform to its DTD",
        help_uri: Some(XMLLINT_HELP),
        default_severity: Severity::Error,
    },
    RuleDescriptor {
        id: RuleId::XmllintError,
        name: "GenericError",
        short_description: "xmllint error",
        full_description: "xmllint reported an error that is neither a parser nor a validity error",
        help_uri: Some(XMLLINT_HELP),
        default_severity: Severity::Warning,
    },
];

/// Immutable snapshot of the rules reported by one tool
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rule_set: RuleSet,
    rules: Vec<&'static RuleDescriptor>,
}

impl RuleRegistry {
    /// Registry for a rule set, populated from the compiled-in descriptor table
    pub fn builtin(rule_set: RuleSet) -> Self {
        Self::from_descriptors(rule_set, DESCRIPTORS)
    }

    fn from_descriptors(rule_set: RuleSet, descriptors: &'static [RuleDescriptor]) -> Self {
        let wanted = rule_set.emitted_rules();
        let rules = descriptors
            .iter()
            .filter(|descriptor| wanted.contains(&descriptor.id))
            .collect();
        Self { rule_set, rules }
    }

    /// Fails if an emitted rule id has no descriptor.
    pub fn verify(&self) -> Result<()> {
        let missing: Vec<&str> = self
            .rule_set
            .emitted_rules()
            .iter()
            .filter(|id| self.get(**id).is_none())
            .map(RuleId::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ScanError::Configuration(format!(
                "rule ids without a registry entry: {}",
                missing.join(", ")
            )))
        }
    }

    /// Build and verify in one step.
    pub fn load(rule_set: RuleSet) -> Result<Self> {
        let registry = Self::builtin(rule_set);
        registry.verify()?;
        Ok(registry)
    }

    pub fn get(&self, id: RuleId) -> Option<&RuleDescriptor> {
        self.rules.iter().copied().find(|descriptor| descriptor.id == id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &RuleDescriptor> {
        self.rules.iter().copied()
    }

    pub fn rule_set(&self) -> RuleSet {
        self.rule_set
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Default severity of a rule; every rule is in the table, checked by the tests below.
pub fn default_severity(id: RuleId) -> Severity {
    DESCRIPTORS
        .iter()
        .find(|descriptor| descriptor.id == id)
        .map(|descriptor| descriptor.default_severity)
        .unwrap_or(Severity::Error)
}

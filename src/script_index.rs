//! Case-insensitive index of the project's script files.

use std::collections::HashMap;

use tracing::warn;

use crate::file_discovery::FileReference;

/// Outcome of resolving a script attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLookup<'a> {
    /// No script has this name in any casing
    Missing,
    /// A script exists but its on-disk name is cased differently
    CasingMismatch { canonical: &'a str },
    /// Exact match
    Found,
}

/// Lower-cased file name to on-disk file name. Built once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ScriptReferenceIndex {
    scripts: HashMap<String, String>,
}

impl ScriptReferenceIndex {
    /// Register every script by file name.
    ///
    /// Names that collide case-insensitively resolve to the one enumerated last.
    pub fn build<'a>(script_files: impl IntoIterator<Item = &'a FileReference>) -> Self {
        let mut scripts = HashMap::new();
        for reference in script_files {
            let Some(name) = reference.file_name() else {
                continue;
            };
            if let Some(previous) = scripts.insert(name.to_lowercase(), name.to_string())
                && previous != name
            {
                warn!(
                    script = %reference.relative(),
                    replaced = %previous,
                    "script names collide when case is ignored"
                );
            }
        }
        Self { scripts }
    }

    /// Canonical file name for `name`, ignoring case
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.scripts.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn resolve(&self, name: &str) -> ScriptLookup<'_> {
        match self.lookup(name) {
            None => ScriptLookup::Missing,
            Some(canonical) if canonical == name => ScriptLookup::Found,
            Some(canonical) => ScriptLookup::CasingMismatch { canonical },
        }
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl FromIterator<String> for ScriptReferenceIndex {
    fn from_iter<I: IntoIterator<Item = String>>(names: I) -> Self {
        let scripts = names
            .into_iter()
            .map(|name| (name.to_lowercase(), name))
            .collect();
        Self { scripts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn reference(path: &str) -> FileReference {
        FileReference::new(Path::new("/forms"), PathBuf::from("/forms").join(path))
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let files = [reference("Rule/BuildMap.bsh"), reference("scripts/pre.bsh")];
        let index = ScriptReferenceIndex::build(&files);

        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup("buildmap.BSH"), Some("BuildMap.bsh"));
        assert_eq!(index.lookup("PRE.bsh"), Some("pre.bsh"));
        assert_eq!(index.lookup("post.bsh"), None);
    }

    #[test]
    fn test_resolve() {
        let index: ScriptReferenceIndex = ["foo.bsh".to_string()].into_iter().collect();

        assert_eq!(index.resolve("foo.bsh"), ScriptLookup::Found);
        assert_eq!(
            index.resolve("Foo.bsh"),
            ScriptLookup::CasingMismatch { canonical: "foo.bsh" }
        );
        assert_eq!(index.resolve("Missing.bsh"), ScriptLookup::Missing);
    }

    #[test]
    fn test_collision_last_wins() {
        let files = [reference("a/Foo.bsh"), reference("b/foo.BSH")];
        let index = ScriptReferenceIndex::build(&files);

        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("foo.bsh"), Some("foo.BSH"));
    }

    #[test]
    fn test_empty_index() {
        let index = ScriptReferenceIndex::default();
        assert!(index.is_empty());
        assert_eq!(index.resolve("anything.bsh"), ScriptLookup::Missing);
    }
}

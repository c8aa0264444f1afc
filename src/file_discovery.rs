use crate::error::{Result, ScanError};
use globset::{GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// A discovered file: where to read it and how to report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileReference {
    /// Root-relative reference with forward slashes, used in diagnostics
    relative: String,
    /// Path used to open the file
    path: PathBuf,
}

impl FileReference {
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let relative = relative_uri(root, &path);
        Self { relative, path }
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component as it is cased on disk
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

fn relative_uri(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// State of one discovery walk
#[derive(Default)]
struct Walk {
    /// Canonical directories already walked
    visited: HashSet<PathBuf>,
    files: Vec<FileReference>,
    /// Symbolic links waiting to be followed
    links: Vec<PathBuf>,
}

/// Async recursive file discovery filtered by extension
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include, lower-case, without the dot
    extensions: Vec<String>,
    /// Exclude patterns set, matched against root-relative references
    exclude_set: Option<GlobSet>,
    /// Follow symbolic links
    follow_symlinks: bool,
}

impl FileDiscovery {
    /// Discovery of `*.xml` files
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            exclude_set: None,
            follow_symlinks: false,
        }
    }

    /// Set file extensions to discover
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Add exclude patterns
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        if patterns.is_empty() {
            self.exclude_set = None;
            return Ok(self);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = globset::GlobBuilder::new(&pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    ScanError::Configuration(format!("Invalid glob pattern '{}': {}", pattern, e))
                })?;
            builder.add(glob);
        }

        self.exclude_set = Some(builder.build().map_err(|e| {
            ScanError::Configuration(format!("Failed to build exclude glob set: {}", e))
        })?);
        Ok(self)
    }

    /// Set whether to follow symbolic links
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover matching files under `root`, sorted by relative reference.
    ///
    /// Fails only when `root` itself is not a readable directory. Entries below
    /// the root that cannot be read are logged and skipped.
    pub async fn discover_files(&self, root: &Path) -> Result<Vec<FileReference>> {
        let discovery_error = |reason: String| ScanError::Discovery {
            path: root.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(root)
            .await
            .map_err(|e| discovery_error(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(discovery_error("not a directory".to_string()));
        }

        let mut walk = Walk::default();
        if let Ok(canonical) = fs::canonicalize(root).await {
            walk.visited.insert(canonical);
        }

        let mut read_dir = fs::read_dir(root)
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(discovery_error(e.to_string())),
            };
            self.visit(root, entry.path(), &mut walk, false).await;
        }

        // Links are followed only once every real directory has been claimed, so a
        // directory reachable both ways is reported under its real path.
        while !walk.links.is_empty() {
            let mut links = std::mem::take(&mut walk.links);
            links.sort();
            for link in links {
                self.visit(root, link, &mut walk, true).await;
            }
        }

        let mut files = walk.files;
        files.sort();
        Ok(files)
    }

    async fn visit(&self, root: &Path, path: PathBuf, walk: &mut Walk, through_link: bool) {
        if let Err(e) = self
            .discover_files_recursive(root, path.clone(), walk, through_link)
            .await
        {
            warn!(path = %path.display(), error = %e, "skipping unreadable entry");
        }
    }

    /// Recursive helper for discovering files
    fn discover_files_recursive<'a>(
        &'a self,
        root: &'a Path,
        path: PathBuf,
        walk: &'a mut Walk,
        through_link: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let link_metadata = fs::symlink_metadata(&path).await?;
            if link_metadata.file_type().is_symlink() && !through_link {
                if self.follow_symlinks {
                    walk.links.push(path);
                }
                return Ok(());
            }

            // Follows the link when there is one; a dangling link fails here.
            let metadata = fs::metadata(&path).await?;

            if metadata.is_file() {
                let reference = FileReference::new(root, path);
                if self.should_process(&reference) {
                    walk.files.push(reference);
                }
            } else if metadata.is_dir() {
                let canonical = fs::canonicalize(&path).await?;
                if !walk.visited.insert(canonical) {
                    debug!(path = %path.display(), "directory already visited");
                    return Ok(());
                }

                let mut read_dir = fs::read_dir(&path).await?;
                while let Some(entry) = read_dir.next_entry().await? {
                    let entry_path = entry.path();
                    if let Err(e) = self
                        .discover_files_recursive(root, entry_path.clone(), walk, false)
                        .await
                    {
                        warn!(
                            path = %entry_path.display(),
                            error = %e,
                            "skipping unreadable entry"
                        );
                    }
                }
            }

            // Sockets, fifos and devices are neither files nor directories.
            Ok(())
        })
    }

    /// Check if a file should be processed based on extension and exclude patterns
    pub fn should_process(&self, reference: &FileReference) -> bool {
        let matches_extension = reference
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()));
        if !matches_extension {
            return false;
        }

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(reference.relative())
        {
            return false;
        }

        true
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

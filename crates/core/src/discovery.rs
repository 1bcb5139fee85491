use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::models::CandidateFile;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Component, Path};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Include/exclude globs over `/`-separated paths relative to the search root.
#[derive(Debug, Clone)]
pub struct CandidateMatcher {
    include: GlobSet,
    exclude: GlobSet,
    /// Directory forms of the `.../**` excludes, used to prune the walk.
    exclude_dirs: GlobSet,
}

impl CandidateMatcher {
    pub fn new(config: &SearchConfig) -> Result<Self, globset::Error> {
        let extensions: Vec<&str> = config
            .extensions
            .iter()
            .map(|extension| extension.trim().trim_start_matches('.'))
            .filter(|extension| !extension.is_empty())
            .collect();

        let mut include = GlobSetBuilder::new();
        if !extensions.is_empty() {
            include.add(glob(&format!("**/*.{{{}}}", extensions.join(",")))?);
        }

        let mut exclude = GlobSetBuilder::new();
        let mut exclude_dirs = GlobSetBuilder::new();
        for pattern in &config.exclude_globs {
            exclude.add(glob(pattern)?);
            if let Some(directory) = pattern.strip_suffix("/**") {
                exclude_dirs.add(glob(directory)?);
            }
        }

        Ok(Self {
            include: include.build()?,
            exclude: exclude.build()?,
            exclude_dirs: exclude_dirs.build()?,
        })
    }

    pub fn is_candidate(&self, relative_path: &str) -> bool {
        self.include.is_match(relative_path) && !self.exclude.is_match(relative_path)
    }

    /// True when nothing below the directory can be a candidate.
    pub fn is_excluded_dir(&self, relative_path: &str) -> bool {
        self.exclude_dirs.is_match(relative_path)
    }
}

fn glob(pattern: &str) -> Result<globset::Glob, globset::Error> {
    GlobBuilder::new(pattern)
        .case_insensitive(true)
        .literal_separator(true)
        .build()
}

/// Recursively lists text-like files under `root`, sorted by relative path.
/// Symlinks are not followed; unreadable directory entries are skipped.
pub fn discover_candidates(
    root: &Path,
    matcher: &CandidateMatcher,
) -> Result<Vec<CandidateFile>, SearchError> {
    let root = root
        .canonicalize()
        .map_err(|_| SearchError::MissingRoot(root.display().to_string()))?;
    if !root.is_dir() {
        return Err(SearchError::MissingRoot(root.display().to_string()));
    }

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            match entry.path().strip_prefix(&root) {
                Ok(relative) => !matcher.is_excluded_dir(&slash_path(relative)),
                Err(_) => true,
            }
        });

    let mut candidates = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(error = %error, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let relative_path = slash_path(relative);
        if !matcher.is_candidate(&relative_path) {
            continue;
        }

        candidates.push(CandidateFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            relative_path,
            absolute_path: entry.path().to_string_lossy().into_owned(),
        });
    }

    candidates.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    debug!(root = %root.display(), count = candidates.len(), "discovered candidate files");
    Ok(candidates)
}

fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

//! Dictionary set scanner
//!
//! Finds dictionaries under a root directory. Each immediate subdirectory
//! holding an entry archive becomes one dictionary; when none does, the
//! root itself is tried as a single dictionary directory.

use crate::descriptor::DictionaryDescriptor;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Scanner errors
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Not a directory or does not exist: {path}")]
    InvalidRoot { path: PathBuf },

    #[error("Failed to list {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Order of resource archives within a dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceOrder {
    /// Directory listing order; platform dependent
    #[default]
    Listing,
    /// Lexicographic by file name
    Name,
}

/// File classification rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRules {
    pub entry_extension: String,
    pub resource_extension: String,
    pub injection_extension: String,
    pub resource_order: ResourceOrder,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            entry_extension: "mdx".to_string(),
            resource_extension: "mdd".to_string(),
            injection_extension: "html".to_string(),
            resource_order: ResourceOrder::Listing,
        }
    }
}

/// Discover dictionaries under `root`.
///
/// An empty result means nothing was found at either level; callers treat
/// that as fatal.
pub fn scan(root: &Path, rules: &ScanRules) -> Result<Vec<DictionaryDescriptor>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::InvalidRoot {
            path: root.to_path_buf(),
        });
    }

    let mut descriptors = Vec::new();
    for subdir in list(root, true)? {
        let subdir = subdir.into_path();
        if !subdir.is_dir() {
            continue;
        }
        match classify(&subdir, rules) {
            Ok(Some(descriptor)) => descriptors.push(descriptor),
            Ok(None) => debug!(dir = %subdir.display(), "No entry archive, skipping"),
            Err(e) => warn!(dir = %subdir.display(), "Skipping unreadable directory: {}", e),
        }
    }

    if descriptors.is_empty() {
        debug!(dir = %root.display(), "No dictionary subdirectories, trying root");
        descriptors.extend(classify(root, rules)?);
    }

    Ok(descriptors)
}

/// Classify the immediate files of one directory
fn classify(dir: &Path, rules: &ScanRules) -> Result<Option<DictionaryDescriptor>, ScanError> {
    let mut entry_archive: Option<String> = None;
    let mut resource_archives = Vec::new();
    let mut injection_fragment = None;

    for file in list(dir, false)? {
        if !file.path().is_file() {
            continue;
        }
        let name = file.file_name().to_string_lossy().into_owned();
        let Some(ext) = file.path().extension().and_then(OsStr::to_str) else {
            continue;
        };

        if ext.eq_ignore_ascii_case(&rules.entry_extension) {
            if let Some(previous) = entry_archive.replace(name) {
                debug!(dir = %dir.display(), "Replacing entry archive {}", previous);
            }
        } else if ext.eq_ignore_ascii_case(&rules.resource_extension) {
            resource_archives.push(name);
        } else if ext.eq_ignore_ascii_case(&rules.injection_extension) {
            injection_fragment = Some(name);
        }
    }

    let Some(entry_archive) = entry_archive else {
        return Ok(None);
    };

    if rules.resource_order == ResourceOrder::Name {
        resource_archives.sort();
    }

    Ok(Some(DictionaryDescriptor {
        root_dir: dir.to_path_buf(),
        entry_archive,
        resource_archives,
        injection_fragment,
    }))
}

fn list(dir: &Path, sorted: bool) -> Result<Vec<walkdir::DirEntry>, ScanError> {
    let mut walker = WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true);
    if sorted {
        walker = walker.sort_by_file_name();
    }

    // Only an unreadable `dir` fails the listing; bad entries are skipped
    let mut entries = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => entries.push(entry),
            Err(source) if source.depth() == 0 => {
                return Err(ScanError::Walk {
                    path: dir.to_path_buf(),
                    source,
                })
            }
            Err(e) => warn!(dir = %dir.display(), "Skipping unreadable entry: {}", e),
        }
    }
    Ok(entries)
}

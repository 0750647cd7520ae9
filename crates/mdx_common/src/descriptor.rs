//! Dictionary descriptors and the info projection served by the gateway

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File set of one discovered dictionary.
///
/// Produced once by the scanner and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryDescriptor {
    /// Directory holding the archives
    pub root_dir: PathBuf,
    /// Entry archive file name (e.g. `oaldpe.mdx`)
    pub entry_archive: String,
    /// Resource archive file names (e.g. `oaldpe.mdd`, `oaldpe.1.mdd`)
    pub resource_archives: Vec<String>,
    /// Optional per-dictionary injection fragment file name
    pub injection_fragment: Option<String>,
}

impl DictionaryDescriptor {
    pub fn entry_archive_path(&self) -> PathBuf {
        self.root_dir.join(&self.entry_archive)
    }

    pub fn resource_archive_paths(&self) -> Vec<PathBuf> {
        self.resource_archives
            .iter()
            .map(|name| self.root_dir.join(name))
            .collect()
    }

    pub fn injection_fragment_path(&self) -> Option<PathBuf> {
        self.injection_fragment
            .as_ref()
            .map(|name| self.root_dir.join(name))
    }

    /// Display title: the basename of the dictionary directory
    pub fn title(&self) -> String {
        display_title(&self.root_dir)
    }
}

pub(crate) fn display_title(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.to_string_lossy().into_owned())
}

/// File names of a dictionary as exposed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub mdx: String,
    pub mdd_arr: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injection: Option<String>,
}

impl From<&DictionaryDescriptor> for FileInfo {
    fn from(descriptor: &DictionaryDescriptor) -> Self {
        Self {
            mdx: descriptor.entry_archive.clone(),
            mdd_arr: descriptor.resource_archives.clone(),
            injection: descriptor.injection_fragment.clone(),
        }
    }
}

/// Read-only projection of a running dictionary server.
///
/// Header metadata and title never change once the archive is open, so the
/// server computes this once and hands out clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionaryInfo {
    pub mdx_dir: PathBuf,
    pub file_info: FileInfo,
    pub mdx_header: serde_json::Value,
    pub port: u16,
    pub title: String,
}

//! MDict source text archives
//!
//! The layout MDict compilers take as input:
//!
//! ```text
//! headword
//! <definition html, any number of lines>
//! </>
//! ```
//!
//! Resource dumps use the same layout with `\path\to\file` keys and a base64
//! payload as the definition. Binary `.mdx`/`.mdd` files are rejected with a
//! format error; those need a binary engine plugged in through
//! `ArchiveOpener`.

use super::{Archive, ArchiveError, ArchiveOpener, LookupRecord};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const RECORD_TERMINATOR: &str = "</>";

/// Archive loaded from a source text file
#[derive(Debug)]
pub struct SourceArchive {
    records: HashMap<String, String>,
    /// ASCII-lowercased key -> stored key, first record wins
    folded: HashMap<String, String>,
    header: serde_json::Value,
}

impl SourceArchive {
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let bytes = fs::read(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| ArchiveError::Format {
            path: path.to_path_buf(),
            message: "not a source text archive (binary archives need an external engine)"
                .to_string(),
        })?;

        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archive = Self::parse(&title, &text);
        debug!(
            path = %path.display(),
            entries = archive.records.len(),
            "Loaded source archive"
        );
        Ok(archive)
    }

    pub fn parse(title: &str, text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut records = HashMap::new();
        let mut folded = HashMap::new();

        let mut key: Option<&str> = None;
        let mut body: Vec<&str> = Vec::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            match key {
                None => {
                    if !line.trim().is_empty() {
                        key = Some(line.trim());
                    }
                }
                Some(current) if line.trim() == RECORD_TERMINATOR => {
                    if !records.contains_key(current) {
                        folded
                            .entry(current.to_ascii_lowercase())
                            .or_insert_with(|| current.to_string());
                        records.insert(current.to_string(), body.join("\n"));
                    }
                    key = None;
                    body.clear();
                }
                Some(_) => body.push(line),
            }
        }

        let header = serde_json::json!({
            "Title": title,
            "Format": "source",
            "Entries": records.len(),
        });

        Self {
            records,
            folded,
            header,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Archive for SourceArchive {
    fn lookup(&self, key: &str) -> Result<LookupRecord, ArchiveError> {
        if let Some(definition) = self.records.get(key) {
            return Ok(LookupRecord {
                key_text: key.to_string(),
                definition: Some(definition.clone()),
            });
        }

        let nearest = self
            .folded
            .get(&key.to_ascii_lowercase())
            .and_then(|stored| self.records.get_key_value(stored));

        Ok(match nearest {
            Some((stored, definition)) => LookupRecord {
                key_text: stored.clone(),
                definition: Some(definition.clone()),
            },
            None => LookupRecord::missing(key),
        })
    }

    fn header(&self) -> serde_json::Value {
        self.header.clone()
    }
}

/// Opener used by the mdxd binary
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceArchiveOpener;

impl ArchiveOpener for SourceArchiveOpener {
    fn open(&self, path: &Path) -> Result<Arc<dyn Archive>, ArchiveError> {
        Ok(Arc::new(SourceArchive::load(path)?))
    }
}

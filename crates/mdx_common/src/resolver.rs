//! Lookup resolution for one dictionary
//!
//! A request key resolves, first match wins, to:
//! 1. a regular file under the dictionary directory,
//! 2. an entry definition when the key has no extension (following
//!    `@@@LINK=` cross-references and retrying case variants of any key
//!    a chain misses on),
//! 3. a resource when the key has an extension,
//! 4. nothing.
//!
//! Resolution holds no state between calls and never caches results.

use crate::engine::{Archive, ArchiveError};
use crate::mime::{has_extension, mime_for};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Cross-reference directive inside a definition payload
static LINK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@@@LINK=([^\r\n]*)").expect("valid link pattern"));

/// Upper bound on cross-reference hops for one candidate key
pub const MAX_LINK_HOPS: usize = 64;

/// Separator used by resource archive keys
pub const RESOURCE_SEPARATOR: char = '\\';

/// Rewrites a request key into a candidate headword, or declines
pub type KeyTransform = fn(&str) -> Option<String>;

/// Headword candidates, tried in order until one yields a definition
pub const CASE_VARIANTS: &[KeyTransform] = &[literal, lowercase, leading_capital];

fn literal(key: &str) -> Option<String> {
    Some(key.to_string())
}

fn lowercase(key: &str) -> Option<String> {
    key.chars()
        .any(char::is_uppercase)
        .then(|| key.to_lowercase())
}

fn leading_capital(key: &str) -> Option<String> {
    if !is_all_uppercase(key) {
        return None;
    }
    let mut chars = key.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect())
}

fn is_all_uppercase(key: &str) -> bool {
    key.chars().any(char::is_uppercase) && !key.chars().any(char::is_lowercase)
}

/// Outcome of resolving one key
#[derive(Clone, PartialEq, Eq)]
pub enum Resolution {
    StaticFile { path: PathBuf, mime: String },
    Entry { definition: String },
    Resource { key: String, bytes: Vec<u8>, mime: String },
    NotFound,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::StaticFile { path, mime } => f
                .debug_struct("StaticFile")
                .field("path", path)
                .field("mime", mime)
                .finish(),
            Resolution::Entry { definition } => f
                .debug_struct("Entry")
                .field("len", &definition.len())
                .finish(),
            Resolution::Resource { key, bytes, mime } => f
                .debug_struct("Resource")
                .field("key", key)
                .field("len", &bytes.len())
                .field("mime", mime)
                .finish(),
            Resolution::NotFound => f.write_str("NotFound"),
        }
    }
}

/// End of one cross-reference chain
enum Chain {
    Found(String),
    /// Last key looked up had no definition
    Missing(String),
    /// Cycle or hop limit
    Stopped,
}

/// Resolution failures. A miss is `Resolution::NotFound`, not an error.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Failed to stat {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Resource {key} is not valid base64: {source}")]
    Payload {
        key: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Resolves request keys against one dictionary's archives and directory
#[derive(Clone)]
pub struct LookupResolver {
    root_dir: PathBuf,
    entries: Arc<dyn Archive>,
    resources: Vec<Arc<dyn Archive>>,
}

impl LookupResolver {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        entries: Arc<dyn Archive>,
        resources: Vec<Arc<dyn Archive>>,
    ) -> Self {
        Self {
            root_dir: root_dir.into(),
            entries,
            resources,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Header metadata of the entry archive
    pub fn header(&self) -> serde_json::Value {
        self.entries.header()
    }

    pub fn resolve(&self, key: &str) -> Result<Resolution, ResolveError> {
        if key.is_empty() {
            return Ok(Resolution::NotFound);
        }

        if let Some(path) = self.static_file(key)? {
            return Ok(Resolution::StaticFile {
                path,
                mime: mime_for(key),
            });
        }

        if has_extension(key) {
            self.resolve_resource(key)
        } else {
            self.resolve_entry(key)
        }
    }

    /// Path of a regular file at `root_dir/key`, if there is one
    fn static_file(&self, key: &str) -> Result<Option<PathBuf>, ResolveError> {
        let Some(path) = confined_path(&self.root_dir, key) else {
            return Ok(None);
        };

        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                Ok(None)
            }
            Err(source) => Err(ResolveError::Io { path, source }),
        }
    }

    fn resolve_entry(&self, key: &str) -> Result<Resolution, ResolveError> {
        let mut visited = HashSet::new();
        match self.try_variants(key, &mut visited, 0)? {
            Some(definition) => Ok(Resolution::Entry { definition }),
            None => {
                debug!(key, "No definition");
                Ok(Resolution::NotFound)
            }
        }
    }

    /// Try each case variant of `key`, following its cross-references.
    ///
    /// When a chain ends at a different key with no definition, the variants
    /// of that key are tried next. `visited` is shared across the whole
    /// request, so no key is looked up twice.
    fn try_variants(
        &self,
        key: &str,
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> Result<Option<String>, ResolveError> {
        for transform in CASE_VARIANTS {
            let Some(candidate) = transform(key) else {
                continue;
            };
            if visited.contains(&candidate) {
                continue;
            }

            match self.follow_links(&candidate, visited)? {
                Chain::Found(definition) => return Ok(Some(definition)),
                Chain::Missing(last) if last != candidate && depth < MAX_LINK_HOPS => {
                    if let Some(definition) = self.try_variants(&last, visited, depth + 1)? {
                        return Ok(Some(definition));
                    }
                }
                Chain::Missing(_) | Chain::Stopped => {}
            }
        }
        Ok(None)
    }

    /// Look `start` up, following cross-references.
    ///
    /// Stops at a missing or empty definition, or as soon as a key repeats.
    fn follow_links(&self, start: &str, visited: &mut HashSet<String>) -> Result<Chain, ResolveError> {
        let mut key = start.to_string();

        for _ in 0..MAX_LINK_HOPS {
            if !visited.insert(key.clone()) {
                debug!(key = %key, "Cross-reference cycle");
                return Ok(Chain::Stopped);
            }

            let record = self.entries.lookup(&key)?;
            let Some(definition) = record.definition.filter(|d| !d.is_empty()) else {
                return Ok(Chain::Missing(key));
            };

            match link_target(&definition) {
                Some(target) => {
                    debug!(from = %key, to = %target, "Following cross-reference");
                    key = target;
                }
                None => return Ok(Chain::Found(definition)),
            }
        }

        debug!(start, "Cross-reference chain too long");
        Ok(Chain::Stopped)
    }

    fn resolve_resource(&self, key: &str) -> Result<Resolution, ResolveError> {
        let resource_key = resource_key(key);

        for archive in &self.resources {
            let record = archive.lookup(&resource_key)?;
            if record.key_text != resource_key {
                continue;
            }
            let Some(payload) = record.definition.filter(|p| !p.is_empty()) else {
                continue;
            };

            let compact: String = payload.split_ascii_whitespace().collect();
            let bytes = STANDARD
                .decode(compact)
                .map_err(|source| ResolveError::Payload {
                    key: resource_key.clone(),
                    source,
                })?;

            return Ok(Resolution::Resource {
                key: key.to_string(),
                bytes,
                mime: mime_for(key),
            });
        }

        debug!(key = %resource_key, "No resource");
        Ok(Resolution::NotFound)
    }
}

/// `img/cat.png` -> `\img\cat.png`
pub fn resource_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 1);
    out.push(RESOURCE_SEPARATOR);
    out.extend(key.chars().map(|c| if c == '/' { RESOURCE_SEPARATOR } else { c }));
    out
}

/// Target of a `@@@LINK=` directive, if the definition is a cross-reference
pub fn link_target(definition: &str) -> Option<String> {
    let captures = LINK_PATTERN.captures(definition)?;
    let target = captures[1].trim_matches(|c: char| c.is_whitespace() || c == '\0');
    (!target.is_empty()).then(|| target.to_string())
}

/// Join `key` onto `root` segment by segment, refusing anything that could
/// leave `root`.
fn confined_path(root: &Path, key: &str) -> Option<PathBuf> {
    if key.contains('\0') {
        return None;
    }
    let mut path = root.to_path_buf();
    for segment in key.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains('\\') || Path::new(s).is_absolute() => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

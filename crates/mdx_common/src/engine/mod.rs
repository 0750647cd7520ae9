//! Dictionary engine contract
//!
//! Binary archive decoding lives outside this crate. The resolver only needs
//! keyed lookups and the header metadata, so that is all the contract asks
//! for. `MemoryArchive` backs tests and embedders; `source` reads the MDict
//! source text layout.

pub mod source;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub use source::{SourceArchive, SourceArchiveOpener};

/// Result of a single archive lookup.
///
/// `key_text` is the key the engine actually matched, which may differ from
/// the probe (engines are allowed best-effort matches). For resource
/// archives `definition` holds the base64 transport encoding of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRecord {
    pub key_text: String,
    pub definition: Option<String>,
}

impl LookupRecord {
    pub fn missing(key: &str) -> Self {
        Self {
            key_text: key.to_string(),
            definition: None,
        }
    }
}

/// Archive errors
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to open archive {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed archive {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("Archive read failed: {0}")]
    Read(String),
}

/// One opened entry or resource archive.
///
/// Implementations must tolerate concurrent read-only lookups.
pub trait Archive: Send + Sync {
    fn lookup(&self, key: &str) -> Result<LookupRecord, ArchiveError>;

    /// Header metadata, opaque to the serving layer
    fn header(&self) -> serde_json::Value;
}

/// Opens archives found by the scanner
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn Archive>, ArchiveError>;
}

/// In-memory archive.
///
/// Lookups are exact. `with_near_miss` registers a probe that answers with a
/// different key text, the way real engines hand back their nearest key.
/// Every probe is recorded.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    /// probe -> (key text, definition)
    records: BTreeMap<String, (String, String)>,
    header: serde_json::Value,
    probes: Mutex<Vec<String>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, key: impl Into<String>, definition: impl Into<String>) -> Self {
        let key = key.into();
        self.records.insert(key.clone(), (key, definition.into()));
        self
    }

    pub fn with_near_miss(
        mut self,
        probe: impl Into<String>,
        key_text: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        self.records
            .insert(probe.into(), (key_text.into(), definition.into()));
        self
    }

    pub fn with_header(mut self, header: serde_json::Value) -> Self {
        self.header = header;
        self
    }

    /// Keys looked up so far, in order
    pub fn probes(&self) -> Vec<String> {
        match self.probes.lock() {
            Ok(probes) => probes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_probe(&self, key: &str) {
        match self.probes.lock() {
            Ok(mut probes) => probes.push(key.to_string()),
            Err(poisoned) => poisoned.into_inner().push(key.to_string()),
        }
    }
}

impl Archive for MemoryArchive {
    fn lookup(&self, key: &str) -> Result<LookupRecord, ArchiveError> {
        self.record_probe(key);

        Ok(match self.records.get(key) {
            Some((key_text, definition)) => LookupRecord {
                key_text: key_text.clone(),
                definition: Some(definition.clone()),
            },
            None => LookupRecord::missing(key),
        })
    }

    fn header(&self) -> serde_json::Value {
        self.header.clone()
    }
}

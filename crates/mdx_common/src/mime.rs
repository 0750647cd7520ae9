//! Content types by file extension

use std::path::Path;

/// Served when the extension is unknown or missing
pub const FALLBACK_MIME: &str = "application/octet-stream";

pub fn mime_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}

/// True when the last path segment carries an extension (`img/cat.png`),
/// false for bare headwords (`cat`) and dotfiles (`.hidden`).
pub fn has_extension(key: &str) -> bool {
    Path::new(key).extension().is_some()
}

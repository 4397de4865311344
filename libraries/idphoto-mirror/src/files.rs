//! Filename helpers shared by the store, engine and watcher

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Accepted photo extensions, in lookup precedence order
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Suffix for in-flight copies inside the mirror directory; never an accepted
/// extension, so a source photo can't share a name with a temporary copy
pub(crate) const PARTIAL_SUFFIX: &str = ".idphoto-partial";

/// Check if a path has an accepted photo extension
pub fn is_accepted_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ACCEPTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Case-insensitive index key for a filename
pub fn index_key(filename: &str) -> String {
    filename.to_lowercase()
}

/// Whether a filename is a leftover temporary copy
pub(crate) fn is_partial(filename: &str) -> bool {
    filename.ends_with(PARTIAL_SUFFIX)
}

pub(crate) fn partial_name(filename: &str) -> String {
    format!("{}{}", filename, PARTIAL_SUFFIX)
}

/// Millisecond precision used for modification-time comparison
pub fn mtime_millis(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i128,
        Err(e) => -(e.duration().as_millis() as i128),
    }
}

pub fn same_mtime(a: SystemTime, b: SystemTime) -> bool {
    mtime_millis(a) == mtime_millis(b)
}

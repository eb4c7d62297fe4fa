//! Reserved-character escaping and storage file paths.
//!
//! Every host and datasource name goes through [`escape`] exactly once, whether
//! it comes from a bus event or from the schema configuration, so file paths
//! and schema keys always agree.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Percent-encode a single name component.
///
/// Only ASCII alphanumerics and `-_.~` are kept; `/`, spaces and `:` are
/// encoded, so the result is one path segment and one protocol token. The
/// relative components `.` and `..` are encoded too.
pub fn escape(raw: &str) -> Cow<'_, str> {
    match raw {
        "." => Cow::Borrowed("%2E"),
        ".." => Cow::Borrowed("%2E%2E"),
        _ => urlencoding::encode(raw),
    }
}

/// Storage file for an escaped `(host, datasource)` pair: `<base>/<host>/<datasource>`.
pub fn storage_path(base_dir: &Path, host: &str, datasource: &str) -> PathBuf {
    base_dir.join(host).join(datasource)
}

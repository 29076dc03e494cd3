//! Remote keys: flat, `/`-delimited object names that never start with a
//! separator.

use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATORS: [char; 2] = ['/', '\\'];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteKey(String);

impl RemoteKey {
    /// `normalize_dir(dir) + base_filename + extension`.
    pub fn from_parts(dir: &str, base_filename: &str, extension: &str) -> Self {
        Self(format!("{}{}{}", normalize_dir(dir), base_filename, extension))
    }

    /// Accept a caller-supplied key, dropping any leading separators.
    pub fn from_user_path(path: &str) -> Self {
        Self(path.trim_start_matches(SEPARATORS).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemoteKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Trim separators from both ends and append exactly one trailing `/`.
/// An empty (or all-separator) directory stays empty.
pub fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim_matches(SEPARATORS);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

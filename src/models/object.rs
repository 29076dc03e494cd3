//! Represents the metadata of an object held by the remote store.

use crate::models::policy::Acl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata returned by a HEAD request, or after a successful PUT/COPY.
///
/// Does not carry the object's bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ObjectInfo {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// Content type (MIME type), when known at upload time.
    pub content_type: Option<String>,

    /// Access-control setting applied on PUT/COPY.
    pub acl: Acl,

    /// Timestamp when object was last written.
    pub last_modified: DateTime<Utc>,
}

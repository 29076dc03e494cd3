//! The host record's storage fields.

use crate::{
    errors::SaveableResult,
    models::{
        pending::{PendingUpload, ValidatedFile},
        policy::PolicyOverrides,
    },
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A row tracking one stored object.
///
/// `remote_path` is `None` until the first successful upload. A record with
/// `is_saved` always has a non-empty path; a record with `is_deleted` is never
/// relocated again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    /// Primary key assigned by the persistence layer.
    pub id: Option<i64>,

    /// Object key inside the bucket.
    pub remote_path: Option<String>,

    /// Set once a PUT succeeded.
    pub is_saved: bool,

    /// Set once a DELETE succeeded.
    pub is_deleted: bool,

    #[serde(skip)]
    pending: Option<PendingUpload>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record as loaded back from the persistence layer, with no upload
    /// attached.
    pub fn stored(
        id: Option<i64>,
        remote_path: Option<String>,
        is_saved: bool,
        is_deleted: bool,
    ) -> Self {
        Self {
            id,
            remote_path,
            is_saved,
            is_deleted,
            pending: None,
        }
    }

    /// The current path, or `""` when unset.
    pub fn path(&self) -> &str {
        self.remote_path.as_deref().unwrap_or_default()
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.remote_path = Some(path.into());
    }

    /// Validate `path` and queue it for upload on the next insert.
    pub async fn attach_local_file(
        &mut self,
        path: impl AsRef<Path>,
        overrides: PolicyOverrides,
    ) -> SaveableResult<&mut Self> {
        let file = ValidatedFile::from_path(path).await?;
        self.pending = Some(PendingUpload { file, overrides });
        Ok(self)
    }

    /// Queue an already validated file for upload on the next insert. The
    /// temp path is re-checked since it may have been cleaned up meanwhile.
    pub async fn attach_validated_file(
        &mut self,
        file: ValidatedFile,
        overrides: PolicyOverrides,
    ) -> SaveableResult<&mut Self> {
        file.ensure_readable().await?;
        let file = file.sniff_content().await?;
        self.pending = Some(PendingUpload { file, overrides });
        Ok(self)
    }

    pub fn pending(&self) -> Option<&PendingUpload> {
        self.pending.as_ref()
    }

    pub(crate) fn take_pending(&mut self) -> Option<PendingUpload> {
        self.pending.take()
    }

    /// Capture the persisted state before the caller starts modifying fields.
    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            remote_path: self.remote_path.clone(),
            is_saved: self.is_saved,
            is_deleted: self.is_deleted,
        }
    }
}

/// Storage fields as they were before an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub remote_path: Option<String>,
    pub is_saved: bool,
    pub is_deleted: bool,
}

impl RecordSnapshot {
    pub fn path(&self) -> &str {
        self.remote_path.as_deref().unwrap_or_default()
    }

    /// True when the path field differs from this snapshot.
    pub fn path_modified(&self, record: &Record) -> bool {
        self.remote_path != record.remote_path
    }
}

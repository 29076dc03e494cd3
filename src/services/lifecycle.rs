//! LifecycleBinder maps the host persistence layer's pre-insert,
//! pre-update and pre-delete events onto upload, relocation and deletion in
//! the object store.
//!
//! Each hook must finish before the host commits the row. On error the host
//! aborts its write, so the stored row never claims a storage state that does
//! not hold. Hooks with nothing to do return [`HookOutcome::Skipped`].

use crate::{
    config::StoreSettings,
    errors::{Compensation, SaveableError, SaveableResult, WriteOp},
    index::LocalIndex,
    models::{
        policy::{NamingPolicy, UniquenessScope},
        record::{Record, RecordSnapshot},
        remote_key::RemoteKey,
    },
    services::{
        extension::resolve_extension,
        path_builder::{NameGenerator, PathBuilder, RandomNameGenerator},
        relocation::RelocationCoordinator,
        uniqueness::UniquenessChecker,
    },
    store::{ObjectStoreClient, StoreError},
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// The store was changed and the record's fields updated.
    Applied,
    /// Nothing to do for this record.
    Skipped,
}

#[derive(Clone)]
pub struct LifecycleBinder {
    store: Arc<dyn ObjectStoreClient>,
    index: Arc<dyn LocalIndex>,
    settings: StoreSettings,
    defaults: NamingPolicy,
    generator: Arc<dyn NameGenerator>,
}

impl LifecycleBinder {
    pub fn new(
        store: Arc<dyn ObjectStoreClient>,
        index: Arc<dyn LocalIndex>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            store,
            index,
            settings,
            defaults: NamingPolicy::default(),
            generator: Arc::new(RandomNameGenerator),
        }
    }

    /// Default policy for uploads; per-upload overrides are applied on top.
    /// Relocations use it as is.
    pub fn with_defaults(mut self, defaults: NamingPolicy) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_name_generator(mut self, generator: Arc<dyn NameGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.settings.bucket
    }

    pub fn defaults(&self) -> &NamingPolicy {
        &self.defaults
    }

    fn checker(&self, scope: UniquenessScope) -> UniquenessChecker<'_> {
        UniquenessChecker::new(
            self.index.as_ref(),
            self.store.as_ref(),
            &self.settings.bucket,
            scope,
        )
    }

    /// Upload the attached file, if any, under a freshly built key.
    ///
    /// The pending upload is consumed whether or not the upload succeeds.
    pub async fn on_before_insert(&self, record: &mut Record) -> SaveableResult<HookOutcome> {
        let Some(pending) = record.take_pending() else {
            debug!("no pending upload; insert proceeds without storage");
            return Ok(HookOutcome::Skipped);
        };
        let file = pending.file;
        let policy = self.defaults.apply(&pending.overrides);

        let extension = resolve_extension(
            &policy.extension,
            file.original_extension().as_deref(),
            file.guessed_extension().as_deref(),
        );
        let checker = self.checker(policy.uniqueness);
        let key = PathBuilder::new(&policy, self.generator.as_ref())
            .build(&extension, &checker)
            .await?;

        let local = File::open(file.temp_path()).await.map_err(|err| {
            SaveableError::local_io(file.temp_path(), format!("could not open upload: {}", err))
        })?;
        let info = self
            .store
            .put_object(
                self.bucket(),
                key.as_str(),
                Box::pin(ReaderStream::new(local)),
                policy.acl,
                file.content_type(),
            )
            .await
            .map_err(|source| SaveableError::StoreWriteFailure {
                op: WriteOp::Put,
                key: key.to_string(),
                source,
            })?;

        record.remote_path = Some(key.into_string());
        record.is_saved = true;
        record.is_deleted = false;
        info!(
            "uploaded {} to {}/{} ({} bytes, {})",
            file.temp_path().display(),
            self.bucket(),
            record.path(),
            info.size_bytes,
            policy.acl
        );

        if policy.delete_local_on_save {
            if let Err(err) = fs::remove_file(file.temp_path()).await {
                warn!(
                    "uploaded but could not delete local file {}: {}",
                    file.temp_path().display(),
                    err
                );
            }
        }

        Ok(HookOutcome::Applied)
    }

    /// Relocate the object when the path field differs from `previous`.
    ///
    /// The record's current path is authoritative for the destination. On
    /// success it is rewritten in normalized form; on failure it is left as
    /// the caller set it and the caller must not persist it.
    pub async fn on_before_update(
        &self,
        record: &mut Record,
        previous: &RecordSnapshot,
    ) -> SaveableResult<HookOutcome> {
        if !previous.path_modified(record) {
            return Ok(HookOutcome::Skipped);
        }
        if previous.is_deleted || record.is_deleted {
            return Err(SaveableError::RecordDeleted {
                path: previous.path().to_string(),
            });
        }

        let old_key = previous.path();
        let new_key = RemoteKey::from_user_path(record.path());
        if new_key.as_str() == old_key && !old_key.is_empty() {
            debug!(key = old_key, "path only differed by leading separators");
            record.remote_path = Some(new_key.into_string());
            return Ok(HookOutcome::Skipped);
        }

        let checker = self.checker(self.defaults.uniqueness);
        let moved = RelocationCoordinator::new(self.store.as_ref(), self.bucket(), self.defaults.acl)
            .relocate(old_key, new_key, &checker)
            .await?;

        record.remote_path = Some(moved.into_string());
        Ok(HookOutcome::Applied)
    }

    /// Delete the record's object. A store failure must abort the host's
    /// delete so the object is not orphaned.
    pub async fn on_before_delete(&self, record: &mut Record) -> SaveableResult<HookOutcome> {
        let path = record.path();
        if path.is_empty() {
            return Ok(HookOutcome::Skipped);
        }

        self.store
            .delete_object(self.bucket(), path)
            .await
            .map_err(|source| SaveableError::StoreDeleteFailure {
                key: path.to_string(),
                compensation: Compensation::NotAttempted,
                source,
            })?;
        info!("deleted {}/{}", self.bucket(), path);

        record.is_deleted = true;
        Ok(HookOutcome::Applied)
    }

    /// Undo an upload whose row was never written. Failures are logged; the
    /// object is then orphaned at the logged key.
    pub async fn discard_upload(&self, record: &mut Record) {
        let key = record.path().to_string();
        if key.is_empty() {
            return;
        }
        match self.store.delete_object(self.bucket(), &key).await {
            Ok(()) => {
                warn!("row write failed; removed uploaded object {}/{}", self.bucket(), key);
                record.remote_path = None;
                record.is_saved = false;
            }
            Err(err) => error!(
                "row write failed and uploaded object {}/{} could not be removed: {}",
                self.bucket(),
                key,
                err
            ),
        }
    }

    /// Move a relocated object back to `previous` after its row write failed.
    /// On success the record's path is restored; otherwise it keeps pointing
    /// at the object's actual location and the failure is logged.
    pub async fn revert_relocation(&self, record: &mut Record, previous: &RecordSnapshot) {
        let moved = record.path().to_string();
        let original = previous.path();
        if moved.is_empty() || original.is_empty() || moved == original {
            return;
        }

        let bucket = self.bucket();
        let reverted = match self
            .store
            .copy_object(bucket, &moved, bucket, original, self.defaults.acl)
            .await
        {
            Ok(_) => self.store.delete_object(bucket, &moved).await,
            Err(err) => {
                error!(
                    "row write failed and object {}/{} could not be copied back to {}: {}",
                    bucket, moved, original, err
                );
                return;
            }
        };
        if let Err(err) = reverted {
            error!(
                "object copied back to {}/{} but {} could not be removed; data is duplicated: {}",
                bucket, original, moved, err
            );
        } else {
            warn!("row write failed; moved {}/{} back to {}", bucket, moved, original);
        }
        record.remote_path = previous.remote_path.clone();
    }

    /// Download the record's object to `target`.
    ///
    /// The payload is streamed into a temp file next to `target` and renamed
    /// into place, so a failed GET never leaves a partial file behind.
    pub async fn download_to(
        &self,
        record: &Record,
        target: impl AsRef<Path>,
        overwrite: bool,
    ) -> SaveableResult<()> {
        let target = target.as_ref();
        let key = record.path();
        if key.is_empty() {
            return Err(SaveableError::StoreReadFailure {
                key: String::new(),
                source: StoreError::InvalidObjectKey(String::new()),
            });
        }

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !fs::metadata(&dir).await.is_ok_and(|meta| meta.is_dir()) {
            return Err(SaveableError::local_io(&dir, "directory does not exist"));
        }

        match fs::metadata(target).await {
            Ok(_) if !overwrite => {
                return Err(SaveableError::local_io(
                    target,
                    "file already exists at this location",
                ));
            }
            Ok(meta) if meta.permissions().readonly() => {
                return Err(SaveableError::local_io(target, "file to overwrite is not writable"));
            }
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(SaveableError::local_io(target, format!("cannot stat: {}", err)));
            }
        }

        let tmp_path = dir.join(format!(".download-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path)
            .await
            .map_err(|err| SaveableError::local_io(&dir, format!("directory is not writable ({})", err)))?;

        let read_failure = |source: StoreError| SaveableError::StoreReadFailure {
            key: key.to_string(),
            source,
        };
        let body = match self.store.get_object(self.bucket(), key).await {
            Ok(body) => body,
            Err(source) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(read_failure(source));
            }
        };

        let mut reader = StreamReader::new(body);
        let copied = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(copied) => copied,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(read_failure(StoreError::Io(err)));
            }
        };
        let synced = match file.flush().await {
            Ok(()) => file.sync_all().await,
            Err(err) => Err(err),
        };
        if let Err(err) = synced {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(SaveableError::local_io(&tmp_path, format!("write failed ({})", err)));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, target).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(SaveableError::local_io(target, format!("could not move download into place ({})", err)));
        }

        debug!("downloaded {}/{} to {} ({} bytes)", self.bucket(), key, target.display(), copied);
        Ok(())
    }

    /// Public URL of the record's object. Pure; performs no I/O.
    pub fn public_url(&self, record: &Record, https: bool) -> String {
        format!(
            "{}://{}/{}/{}",
            if https { "https" } else { "http" },
            self.settings.endpoint,
            self.settings.bucket,
            record.path()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::MemoryIndex,
        models::policy::{Acl, PolicyOverrides},
        services::path_builder::tests::ScriptedNames,
        store::{MemoryObjectStore, StoreCall, StoreOp},
    };
    use tempfile::TempDir;

    const BUCKET: &str = "test-bucket";

    struct Fixture {
        store: Arc<MemoryObjectStore>,
        index: Arc<MemoryIndex>,
        binder: LifecycleBinder,
        dir: TempDir,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemoryIndex::new());
        let binder = LifecycleBinder::new(
            store.clone(),
            index.clone(),
            StoreSettings::new("AKIA", "secret", BUCKET),
        )
        .with_name_generator(Arc::new(ScriptedNames::new(&["gen1", "gen2"])));
        Fixture {
            store,
            index,
            binder,
            dir: TempDir::new().unwrap(),
        }
    }

    impl Fixture {
        fn local_file(&self, name: &str, contents: &[u8]) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        }

        fn saved_record(&self, path: &str) -> Record {
            self.store.insert(BUCKET, path, "stored", Acl::PublicRead);
            self.index.insert(path);
            Record::stored(Some(1), Some(path.into()), true, false)
        }
    }

    #[tokio::test]
    async fn insert_without_pending_upload_is_a_no_op() {
        let fx = fixture();
        let mut record = Record::new();
        let outcome = fx.binder.on_before_insert(&mut record).await.unwrap();

        assert_eq!(outcome, HookOutcome::Skipped);
        assert!(!record.is_saved);
        assert!(fx.store.calls().is_empty());
    }

    #[tokio::test]
    async fn insert_uploads_and_marks_saved() {
        let fx = fixture();
        let local = fx.local_file("face.png", b"png-data");
        let mut record = Record::new();
        record
            .attach_local_file(&local, PolicyOverrides::new().dir("/avatars/"))
            .await
            .unwrap();

        let outcome = fx.binder.on_before_insert(&mut record).await.unwrap();

        assert_eq!(outcome, HookOutcome::Applied);
        assert_eq!(record.path(), "avatars/gen1.png");
        assert!(record.is_saved);
        assert!(record.pending().is_none());
        assert_eq!(fx.store.object_bytes(BUCKET, "avatars/gen1.png").unwrap(), &b"png-data"[..]);
        assert!(local.exists());
    }

    #[tokio::test]
    async fn ignored_original_extension_is_replaced_by_sniffed_one() {
        let fx = fixture();
        let local = fx.local_file("photo.png", b"plain text, not an image");
        let mut record = Record::new();
        record
            .attach_local_file(
                &local,
                PolicyOverrides::new()
                    .base_filename("x")
                    .ignore_original_extension(true),
            )
            .await
            .unwrap();

        fx.binder.on_before_insert(&mut record).await.unwrap();

        assert_eq!(record.path(), "x.txt");
    }

    #[tokio::test]
    async fn insert_can_remove_local_file() {
        let fx = fixture();
        let local = fx.local_file("notes.txt", b"hello");
        let mut record = Record::new();
        record
            .attach_local_file(
                &local,
                PolicyOverrides::new()
                    .base_filename("notes")
                    .delete_local_on_save(true),
            )
            .await
            .unwrap();

        fx.binder.on_before_insert(&mut record).await.unwrap();

        assert_eq!(record.path(), "notes.txt");
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn failed_put_leaves_record_unsaved_and_drops_pending() {
        let fx = fixture();
        fx.store.fail_on(StoreOp::Put, "gen1.txt");
        let local = fx.local_file("a.txt", b"a");
        let mut record = Record::new();
        record.attach_local_file(&local, PolicyOverrides::new()).await.unwrap();

        let err = fx.binder.on_before_insert(&mut record).await.unwrap_err();

        assert!(matches!(err, SaveableError::StoreWriteFailure { op: WriteOp::Put, .. }));
        assert!(!record.is_saved);
        assert_eq!(record.remote_path, None);
        assert!(record.pending().is_none());
    }

    #[tokio::test]
    async fn update_without_path_change_does_nothing() {
        let fx = fixture();
        let mut record = fx.saved_record("a.png");
        let before = record.snapshot();
        fx.store.clear_calls();

        let outcome = fx.binder.on_before_update(&mut record, &before).await.unwrap();

        assert_eq!(outcome, HookOutcome::Skipped);
        assert!(fx.store.calls().is_empty());
    }

    #[tokio::test]
    async fn update_relocates_and_normalizes_path() {
        let fx = fixture();
        let mut record = fx.saved_record("a.png");
        let before = record.snapshot();
        record.set_path("//archive/a.png");

        let outcome = fx.binder.on_before_update(&mut record, &before).await.unwrap();

        assert_eq!(outcome, HookOutcome::Applied);
        assert_eq!(record.path(), "archive/a.png");
        assert!(fx.store.contains(BUCKET, "archive/a.png"));
        assert!(!fx.store.contains(BUCKET, "a.png"));
    }

    #[tokio::test]
    async fn failed_relocation_keeps_callers_value_and_surfaces_error() {
        let fx = fixture();
        let mut record = fx.saved_record("a.png");
        let before = record.snapshot();
        record.set_path("b.png");
        fx.store.fail_on(StoreOp::Copy, "a.png");

        let err = fx.binder.on_before_update(&mut record, &before).await.unwrap_err();

        assert!(matches!(err, SaveableError::StoreWriteFailure { op: WriteOp::Copy, .. }));
        assert!(fx.store.contains(BUCKET, "a.png"));
    }

    #[tokio::test]
    async fn deleted_records_are_not_relocated() {
        let fx = fixture();
        let mut record = fx.saved_record("a.png");
        record.is_deleted = true;
        let before = record.snapshot();
        record.set_path("b.png");
        fx.store.clear_calls();

        let err = fx.binder.on_before_update(&mut record, &before).await.unwrap_err();

        assert!(matches!(err, SaveableError::RecordDeleted { .. }));
        assert!(fx.store.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_with_empty_path_is_a_no_op() {
        let fx = fixture();
        let mut record = Record::new();

        let outcome = fx.binder.on_before_delete(&mut record).await.unwrap();

        assert_eq!(outcome, HookOutcome::Skipped);
        assert!(!record.is_deleted);
        assert!(fx.store.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_object_and_flags_record() {
        let fx = fixture();
        let mut record = fx.saved_record("a.png");

        fx.binder.on_before_delete(&mut record).await.unwrap();

        assert!(record.is_deleted);
        assert!(!fx.store.contains(BUCKET, "a.png"));
        assert_eq!(
            fx.store.calls(),
            vec![StoreCall::Delete {
                bucket: BUCKET.into(),
                key: "a.png".into()
            }]
        );
    }

    #[tokio::test]
    async fn failed_delete_is_surfaced() {
        let fx = fixture();
        let mut record = fx.saved_record("a.png");
        fx.store.fail_on(StoreOp::Delete, "a.png");

        let err = fx.binder.on_before_delete(&mut record).await.unwrap_err();

        assert!(matches!(
            err,
            SaveableError::StoreDeleteFailure {
                compensation: Compensation::NotAttempted,
                ..
            }
        ));
        assert!(!record.is_deleted);
    }

    #[tokio::test]
    async fn download_round_trips_and_respects_overwrite() {
        let fx = fixture();
        let local = fx.local_file("doc.pdf", b"%PDF-1.7 body");
        let mut record = Record::new();
        record.attach_local_file(&local, PolicyOverrides::new()).await.unwrap();
        fx.binder.on_before_insert(&mut record).await.unwrap();

        let target = fx.dir.path().join("copy.pdf");
        fx.binder.download_to(&record, &target, false).await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.7 body");

        let err = fx.binder.download_to(&record, &target, false).await.unwrap_err();
        assert!(matches!(err, SaveableError::LocalIoFailure { .. }));
        fx.binder.download_to(&record, &target, true).await.unwrap();
    }

    #[tokio::test]
    async fn download_without_stored_object_is_a_read_failure() {
        let fx = fixture();
        let target = fx.dir.path().join("out.bin");

        let err = fx.binder.download_to(&Record::new(), &target, false).await.unwrap_err();

        assert!(matches!(err, SaveableError::StoreReadFailure { .. }));
        assert!(!target.exists());
        assert!(fx.store.calls().is_empty());
    }

    #[tokio::test]
    async fn download_into_missing_directory_fails() {
        let fx = fixture();
        let record = fx.saved_record("a.png");
        let target = fx.dir.path().join("missing").join("a.png");

        let err = fx.binder.download_to(&record, &target, false).await.unwrap_err();
        assert!(matches!(err, SaveableError::LocalIoFailure { .. }));
    }

    #[tokio::test]
    async fn failed_get_leaves_no_partial_file() {
        let fx = fixture();
        let record = fx.saved_record("a.png");
        fx.store.fail_on(StoreOp::Get, "a.png");
        let target = fx.dir.path().join("out.png");

        let err = fx.binder.download_to(&record, &target, false).await.unwrap_err();

        assert!(matches!(err, SaveableError::StoreReadFailure { .. }));
        assert!(!target.exists());
        let leftovers = std::fs::read_dir(fx.dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".download-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn public_url_is_pure_and_stable() {
        let fx = fixture();
        let record = Record::stored(None, Some("avatars/x.png".into()), false, false);

        let first = fx.binder.public_url(&record, false);
        let second = fx.binder.public_url(&record, false);
        assert_eq!(first, second);
        assert_eq!(first, "http://s3.amazonaws.com/test-bucket/avatars/x.png");
        assert_eq!(
            fx.binder.public_url(&record, true),
            "https://s3.amazonaws.com/test-bucket/avatars/x.png"
        );
        assert!(fx.store.calls().is_empty());
        assert_eq!(fx.index.query_count(), 0);
    }
}

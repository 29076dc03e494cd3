//! src/store/disk.rs
//!
//! DiskObjectStore: an S3-like object store on the local filesystem. Object
//! payloads are sharded beneath `base_path/{bucket}/objects/{shard}/{shard}/{key}`
//! and each object has a JSON metadata sidecar under the parallel `meta/`
//! tree. Useful for development, for the CLI, and as a faithful stand-in for
//! a remote bucket in tests.

use super::{ByteStream, ObjectStoreClient, StoreError, StoreResult};
use crate::models::{object::ObjectInfo, policy::Acl};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Clone, Debug)]
pub struct DiskObjectStore {
    /// Base directory on disk where buckets live.
    pub base_path: PathBuf,
}

impl DiskObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects keys that begin or end with `/` or have a `.` or `..` segment.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        let invalid = || StoreError::InvalidObjectKey(key.to_string());
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        if key.starts_with('/') || key.ends_with('/') {
            return Err(invalid());
        }
        if key.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(invalid());
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let invalid = |reason: &str| StoreError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    fn ensure_location(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    /// Two-level shard identifiers: the first two bytes of MD5(bucket/key).
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn sharded_path(&self, tree: &str, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.bucket_root(bucket);
        path.push(tree);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Location of the payload. Parent directories may not exist yet.
    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.sharded_path("objects", bucket, key)
    }

    fn meta_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.sharded_path("meta", bucket, key).into_os_string();
        path.push(".json");
        PathBuf::from(path)
    }

    async fn read_meta(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectInfo>> {
        match fs::read(self.meta_path(bucket, key)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn write_meta(&self, bucket: &str, info: &ObjectInfo) -> StoreResult<()> {
        let path = self.meta_path(bucket, &info.key);
        let parent = parent_dir(&path)?;
        fs::create_dir_all(&parent).await?;
        fs::write(&path, serde_json::to_vec(info)?).await?;
        Ok(())
    }

    /// Move a fully written temp file into place, replacing any old payload.
    async fn commit_tmp(&self, tmp_path: &Path, file_path: &Path) -> StoreResult<()> {
        if let Err(err) = fs::rename(tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        Ok(())
    }

    async fn remove_if_present(&self, path: &Path) -> StoreResult<()> {
        match fs::remove_file(path).await {
            Ok(_) => debug!("removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }
        Ok(())
    }

    /// Recursively remove empty directories up to `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStoreClient for DiskObjectStore {
    /// Stream the body into a temp file while computing size and MD5, fsync,
    /// then rename into place and record the metadata sidecar.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ByteStream,
        acl: Acl,
        content_type: Option<&str>,
    ) -> StoreResult<ObjectInfo> {
        self.ensure_location(bucket, key)?;

        let file_path = self.object_path(bucket, key);
        let parent = parent_dir(&file_path)?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        self.commit_tmp(&tmp_path, &file_path).await?;

        let info = ObjectInfo {
            key: key.to_string(),
            size_bytes,
            etag: format!("{:x}", digest.compute()),
            content_type: content_type.map(str::to_string),
            acl,
            last_modified: Utc::now(),
        };
        if let Err(err) = self.write_meta(bucket, &info).await {
            let _ = fs::remove_file(&file_path).await;
            return Err(err);
        }

        debug!("stored {}/{} ({} bytes)", bucket, key, size_bytes);
        Ok(info)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ByteStream> {
        self.ensure_location(bucket, key)?;

        let file = File::open(self.object_path(bucket, key))
            .await
            .map_err(|err| {
                if err.kind() == io::ErrorKind::NotFound {
                    StoreError::ObjectNotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Io(err)
                }
            })?;

        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        acl: Acl,
    ) -> StoreResult<ObjectInfo> {
        self.ensure_location(src_bucket, src_key)?;
        self.ensure_location(dst_bucket, dst_key)?;

        let source = self
            .read_meta(src_bucket, src_key)
            .await?
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: src_bucket.to_string(),
                key: src_key.to_string(),
            })?;

        let src_path = self.object_path(src_bucket, src_key);
        let dst_path = self.object_path(dst_bucket, dst_key);
        let parent = parent_dir(&dst_path)?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = fs::copy(&src_path, &tmp_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(if err.kind() == ErrorKind::NotFound {
                StoreError::ObjectNotFound {
                    bucket: src_bucket.to_string(),
                    key: src_key.to_string(),
                }
            } else {
                StoreError::Io(err)
            });
        }
        File::open(&tmp_path).await?.sync_all().await?;
        self.commit_tmp(&tmp_path, &dst_path).await?;

        let info = ObjectInfo {
            key: dst_key.to_string(),
            acl,
            last_modified: Utc::now(),
            ..source
        };
        if let Err(err) = self.write_meta(dst_bucket, &info).await {
            let _ = fs::remove_file(&dst_path).await;
            return Err(err);
        }

        debug!(
            "copied {}/{} -> {}/{}",
            src_bucket, src_key, dst_bucket, dst_key
        );
        Ok(info)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_location(bucket, key)?;

        let file_path = self.object_path(bucket, key);
        let meta_path = self.meta_path(bucket, key);
        self.remove_if_present(&file_path).await?;
        self.remove_if_present(&meta_path).await?;

        let bucket_root = self.bucket_root(bucket);
        for path in [&file_path, &meta_path] {
            if let Some(parent) = path.parent() {
                self.prune_empty_dirs(parent, &bucket_root).await;
            }
        }

        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectInfo>> {
        self.ensure_location(bucket, key)?;

        let Some(info) = self.read_meta(bucket, key).await? else {
            return Ok(None);
        };
        if !fs::try_exists(self.object_path(bucket, key)).await? {
            debug!("metadata for {}/{} has no payload", bucket, key);
            return Ok(None);
        }
        Ok(Some(info))
    }
}

fn parent_dir(path: &Path) -> StoreResult<PathBuf> {
    path.parent().map(Path::to_path_buf).ok_or_else(|| {
        StoreError::Io(io::Error::new(
            ErrorKind::Other,
            "object path missing parent directory",
        ))
    })
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{body_from_bytes, collect_body};
    use tempfile::TempDir;

    const BUCKET: &str = "media-bucket";

    #[tokio::test]
    async fn put_then_get_returns_same_bytes() {
        let dir = TempDir::new().unwrap();
        let store = DiskObjectStore::new(dir.path());

        let info = store
            .put_object(
                BUCKET,
                "avatars/a.png",
                body_from_bytes(&b"png bytes"[..]),
                Acl::Private,
                Some("image/png"),
            )
            .await
            .unwrap();
        assert_eq!(info.size_bytes, 9);
        assert_eq!(info.etag, format!("{:x}", md5::compute(b"png bytes")));

        let body = store.get_object(BUCKET, "avatars/a.png").await.unwrap();
        assert_eq!(&collect_body(body).await.unwrap()[..], b"png bytes");
    }

    #[tokio::test]
    async fn head_reports_missing_and_present_objects() {
        let dir = TempDir::new().unwrap();
        let store = DiskObjectStore::new(dir.path());

        assert!(store.head_object(BUCKET, "x.txt").await.unwrap().is_none());
        store
            .put_object(BUCKET, "x.txt", body_from_bytes("x"), Acl::PublicRead, None)
            .await
            .unwrap();
        let info = store.head_object(BUCKET, "x.txt").await.unwrap().unwrap();
        assert_eq!(info.acl, Acl::PublicRead);
    }

    #[tokio::test]
    async fn copy_applies_destination_acl_and_keeps_source() {
        let dir = TempDir::new().unwrap();
        let store = DiskObjectStore::new(dir.path());
        store
            .put_object(BUCKET, "old/k.bin", body_from_bytes("data"), Acl::Private, None)
            .await
            .unwrap();

        let copied = store
            .copy_object(BUCKET, "old/k.bin", BUCKET, "new/k.bin", Acl::PublicRead)
            .await
            .unwrap();
        assert_eq!(copied.key, "new/k.bin");
        assert_eq!(copied.acl, Acl::PublicRead);
        assert!(store.head_object(BUCKET, "old/k.bin").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn copy_of_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let store = DiskObjectStore::new(dir.path());
        let err = store
            .copy_object(BUCKET, "nope", BUCKET, "dest", Acl::Private)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_prunes_directories() {
        let dir = TempDir::new().unwrap();
        let store = DiskObjectStore::new(dir.path());
        store
            .put_object(BUCKET, "a/b.txt", body_from_bytes("b"), Acl::Private, None)
            .await
            .unwrap();

        store.delete_object(BUCKET, "a/b.txt").await.unwrap();
        store.delete_object(BUCKET, "a/b.txt").await.unwrap();

        assert!(store.head_object(BUCKET, "a/b.txt").await.unwrap().is_none());
        let objects_root = dir.path().join(BUCKET).join("objects");
        assert!(!objects_root.exists());
    }

    #[tokio::test]
    async fn rejects_unsafe_keys_and_bucket_names() {
        let dir = TempDir::new().unwrap();
        let store = DiskObjectStore::new(dir.path());

        for key in ["", "/abs", "a/../b", "./a", "a/./b", "..", "dir/"] {
            let err = store.head_object(BUCKET, key).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidObjectKey(_)), "{key}");
        }
        for bucket in ["ab", "Upper", "-lead", "a..b", "192.168.0.1"] {
            let err = store.head_object(bucket, "k").await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidBucketName { .. }), "{bucket}");
        }
    }

    #[tokio::test]
    async fn dots_inside_a_segment_are_allowed() {
        let dir = TempDir::new().unwrap();
        let store = DiskObjectStore::new(dir.path());

        store
            .put_object(BUCKET, "releases/v1..2.txt", body_from_bytes("notes"), Acl::Private, None)
            .await
            .unwrap();
        store
            .copy_object(BUCKET, "releases/v1..2.txt", BUCKET, "archive/..v1.txt", Acl::Private)
            .await
            .unwrap();

        assert!(store.head_object(BUCKET, "releases/v1..2.txt").await.unwrap().is_some());
        assert!(store.head_object(BUCKET, "archive/..v1.txt").await.unwrap().is_some());
    }
}

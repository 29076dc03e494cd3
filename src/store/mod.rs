//! Object-store client seam.
//!
//! The lifecycle core only speaks PUT/GET/COPY/DELETE/HEAD through
//! [`ObjectStoreClient`]. Timeouts and retries belong to the implementation,
//! never to the caller.

pub mod disk;
pub mod memory;

use crate::models::{object::ObjectInfo, policy::Acl};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;

pub use disk::DiskObjectStore;
pub use memory::{MemoryObjectStore, StoreCall, StoreOp};

/// Streaming object body.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("simulated failure: {0}")]
    Injected(String),
    #[error(transparent)]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Write `body` to `bucket/key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        acl: Acl,
        content_type: Option<&str>,
    ) -> StoreResult<ObjectInfo>;

    /// Open the payload of `bucket/key` for streaming.
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ByteStream>;

    /// Server-side copy. The destination gets `acl`, not the source's setting.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        acl: Acl,
    ) -> StoreResult<ObjectInfo>;

    /// Remove `bucket/key`. Removing an absent key succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Metadata lookup; `None` when no object exists at the key.
    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectInfo>>;
}

/// Wrap an in-memory payload as a single-chunk body.
pub fn body_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Drain a body into one buffer.
pub async fn collect_body(mut body: ByteStream) -> io::Result<Bytes> {
    use futures::StreamExt;

    let mut buf = bytes::BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

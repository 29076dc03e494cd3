//! In-memory object store with a call log and failure injection.
//!
//! Every call is recorded (including ones that fail) so tests can assert on
//! exactly which store operations a lifecycle event performed.

use super::{ByteStream, ObjectStoreClient, StoreError, StoreResult, body_from_bytes, collect_body};
use crate::models::{object::ObjectInfo, policy::Acl};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Put,
    Get,
    Copy,
    Delete,
    Head,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Put { bucket: String, key: String },
    Get { bucket: String, key: String },
    Copy { from: String, to: String },
    Delete { bucket: String, key: String },
    Head { bucket: String, key: String },
}

#[derive(Default)]
struct Inner {
    objects: HashMap<(String, String), (Bytes, ObjectInfo)>,
    failures: HashSet<(StoreOp, String)>,
    calls: Vec<StoreCall>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every `op` against `key` fail until [`clear_failures`] is called.
    ///
    /// [`clear_failures`]: Self::clear_failures
    pub fn fail_on(&self, op: StoreOp, key: impl Into<String>) {
        self.lock().failures.insert((op, key.into()));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(data, _)| data.clone())
    }

    /// Seed an object without recording a call.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>, acl: Acl) {
        let data = data.into();
        let info = object_info(key, &data, acl, None);
        self.lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), (data, info));
    }

    fn record(&self, call: StoreCall, op: StoreOp, key: &str) -> StoreResult<()> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.failures.contains(&(op, key.to_string())) {
            return Err(StoreError::Injected(format!("{:?} {}", op, key)));
        }
        Ok(())
    }
}

fn object_info(key: &str, data: &Bytes, acl: Acl, content_type: Option<&str>) -> ObjectInfo {
    ObjectInfo {
        key: key.to_string(),
        size_bytes: data.len() as i64,
        etag: format!("{:x}", md5::compute(data)),
        content_type: content_type.map(str::to_string),
        acl,
        last_modified: Utc::now(),
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        acl: Acl,
        content_type: Option<&str>,
    ) -> StoreResult<ObjectInfo> {
        let call = StoreCall::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        self.record(call, StoreOp::Put, key)?;

        let data = collect_body(body).await?;
        let info = object_info(key, &data, acl, content_type);
        self.lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), (data, info.clone()));
        Ok(info)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<ByteStream> {
        let call = StoreCall::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        self.record(call, StoreOp::Get, key)?;

        let data = self.object_bytes(bucket, key).ok_or_else(|| StoreError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        Ok(body_from_bytes(data))
    }

    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        acl: Acl,
    ) -> StoreResult<ObjectInfo> {
        let call = StoreCall::Copy {
            from: src_key.to_string(),
            to: dst_key.to_string(),
        };
        self.record(call, StoreOp::Copy, src_key)?;

        let mut inner = self.lock();
        let (data, source) = inner
            .objects
            .get(&(src_bucket.to_string(), src_key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound {
                bucket: src_bucket.to_string(),
                key: src_key.to_string(),
            })?;
        let info = ObjectInfo {
            key: dst_key.to_string(),
            acl,
            last_modified: Utc::now(),
            ..source
        };
        inner
            .objects
            .insert((dst_bucket.to_string(), dst_key.to_string()), (data, info.clone()));
        Ok(info)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let call = StoreCall::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        self.record(call, StoreOp::Delete, key)?;

        self.lock()
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StoreResult<Option<ObjectInfo>> {
        let call = StoreCall::Head {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };
        self.record(call, StoreOp::Head, key)?;

        Ok(self
            .lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(_, info)| info.clone()))
    }
}

//! Decides whether a candidate key is free under a uniqueness scope.

use crate::{
    errors::{SaveableError, SaveableResult},
    index::LocalIndex,
    models::{policy::UniquenessScope, remote_key::RemoteKey},
    store::ObjectStoreClient,
};
use tracing::debug;

pub struct UniquenessChecker<'a> {
    index: &'a dyn LocalIndex,
    store: &'a dyn ObjectStoreClient,
    bucket: &'a str,
    scope: UniquenessScope,
}

impl<'a> UniquenessChecker<'a> {
    pub fn new(
        index: &'a dyn LocalIndex,
        store: &'a dyn ObjectStoreClient,
        bucket: &'a str,
        scope: UniquenessScope,
    ) -> Self {
        Self {
            index,
            store,
            bucket,
            scope,
        }
    }

    /// The local index is consulted first and short-circuits; the remote HEAD
    /// only runs when the key is locally free (or local checks are off).
    /// A scope of `None` accepts every key.
    pub async fn is_unique(&self, key: &RemoteKey) -> SaveableResult<bool> {
        if self.scope.checks_local() {
            let count = self.index.count_with_path(key.as_str()).await?;
            if count > 0 {
                debug!(key = %key, count, "key taken in local index");
                return Ok(false);
            }
        }

        if self.scope.checks_remote() {
            let existing = self
                .store
                .head_object(self.bucket, key.as_str())
                .await
                .map_err(|source| SaveableError::StoreReadFailure {
                    key: key.to_string(),
                    source,
                })?;
            if existing.is_some() {
                debug!(key = %key, bucket = self.bucket, "key taken in remote store");
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::MemoryIndex,
        models::policy::Acl,
        store::{MemoryObjectStore, StoreCall, StoreOp},
    };

    const BUCKET: &str = "test-bucket";

    fn fixtures() -> (MemoryIndex, MemoryObjectStore) {
        let index = MemoryIndex::with_paths(["local.png"]);
        let store = MemoryObjectStore::new();
        store.insert(BUCKET, "remote.png", "x", Acl::Private);
        (index, store)
    }

    async fn unique(scope: UniquenessScope, key: &str) -> bool {
        let (index, store) = fixtures();
        UniquenessChecker::new(&index, &store, BUCKET, scope)
            .is_unique(&RemoteKey::from_user_path(key))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn each_scope_consults_its_sources() {
        assert!(!unique(UniquenessScope::Local, "local.png").await);
        assert!(unique(UniquenessScope::Local, "remote.png").await);

        assert!(unique(UniquenessScope::Remote, "local.png").await);
        assert!(!unique(UniquenessScope::Remote, "remote.png").await);

        assert!(!unique(UniquenessScope::Both, "local.png").await);
        assert!(!unique(UniquenessScope::Both, "remote.png").await);
        assert!(unique(UniquenessScope::Both, "free.png").await);

        assert!(unique(UniquenessScope::None, "local.png").await);
        assert!(unique(UniquenessScope::None, "remote.png").await);
    }

    #[tokio::test]
    async fn local_collision_skips_remote_head() {
        let (index, store) = fixtures();
        let checker = UniquenessChecker::new(&index, &store, BUCKET, UniquenessScope::Both);
        assert!(!checker.is_unique(&RemoteKey::from_user_path("local.png")).await.unwrap());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn none_scope_does_no_io() {
        let (index, store) = fixtures();
        let checker = UniquenessChecker::new(&index, &store, BUCKET, UniquenessScope::None);
        assert!(checker.is_unique(&RemoteKey::from_user_path("x")).await.unwrap());
        assert_eq!(index.query_count(), 0);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_head_is_surfaced() {
        let (index, store) = fixtures();
        store.fail_on(StoreOp::Head, "free.png");
        let checker = UniquenessChecker::new(&index, &store, BUCKET, UniquenessScope::Remote);
        let err = checker
            .is_unique(&RemoteKey::from_user_path("free.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, SaveableError::StoreReadFailure { .. }));
        assert_eq!(
            store.calls(),
            vec![StoreCall::Head {
                bucket: BUCKET.into(),
                key: "free.png".into()
            }]
        );
    }
}

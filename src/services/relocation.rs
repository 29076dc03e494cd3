//! Move emulation for stores that only offer copy and delete.
//!
//! Outcomes are exactly: success (only the new key exists), copy failed (only
//! the old key exists), or source delete failed, in which case the copy is
//! undone when possible and the error records whether the undo worked.

use crate::{
    errors::{Compensation, NamingFailure, SaveableError, SaveableResult, WriteOp},
    models::{policy::Acl, remote_key::RemoteKey},
    services::uniqueness::UniquenessChecker,
    store::ObjectStoreClient,
};
use tracing::{error, info, warn};

pub struct RelocationCoordinator<'a> {
    store: &'a dyn ObjectStoreClient,
    bucket: &'a str,
    acl: Acl,
}

impl<'a> RelocationCoordinator<'a> {
    pub fn new(store: &'a dyn ObjectStoreClient, bucket: &'a str, acl: Acl) -> Self {
        Self { store, bucket, acl }
    }

    /// Copy `old_key` to `new_key`, then delete `old_key`.
    ///
    /// `new_key` must be non-empty and free under `checker`. Once the copy has
    /// started the sequence runs to one of its defined outcomes.
    pub async fn relocate(
        &self,
        old_key: &str,
        new_key: RemoteKey,
        checker: &UniquenessChecker<'_>,
    ) -> SaveableResult<RemoteKey> {
        if new_key.is_empty() {
            return Err(NamingFailure::EmptyDestination.into());
        }
        if old_key.is_empty() {
            return Err(NamingFailure::MissingSource.into());
        }
        if !checker.is_unique(&new_key).await? {
            return Err(NamingFailure::DestinationTaken {
                key: new_key.into_string(),
            }
            .into());
        }

        self.store
            .copy_object(self.bucket, old_key, self.bucket, new_key.as_str(), self.acl)
            .await
            .map_err(|source| SaveableError::StoreWriteFailure {
                op: WriteOp::Copy,
                key: new_key.to_string(),
                source,
            })?;

        if let Err(source) = self.store.delete_object(self.bucket, old_key).await {
            let compensation = match self.store.delete_object(self.bucket, new_key.as_str()).await {
                Ok(()) => {
                    warn!(
                        "could not delete {}/{}; rolled back copy at {}",
                        self.bucket, old_key, new_key
                    );
                    Compensation::RolledBack {
                        new_key: new_key.to_string(),
                    }
                }
                Err(undo_err) => {
                    error!(
                        old_key,
                        new_key = %new_key,
                        bucket = self.bucket,
                        "relocation left duplicated objects: {}",
                        undo_err
                    );
                    Compensation::Failed {
                        new_key: new_key.to_string(),
                        reason: undo_err.to_string(),
                    }
                }
            };
            return Err(SaveableError::StoreDeleteFailure {
                key: old_key.to_string(),
                compensation,
                source,
            });
        }

        info!("relocated {}/{} -> {}", self.bucket, old_key, new_key);
        Ok(new_key)
    }
}

//! Host persistence adapter: runs the lifecycle hook for each write and only
//! touches the row once the hook succeeded.
//!
//! When the row write itself fails after the hook changed the store, insert
//! and update undo the store change on a best-effort basis. A delete cannot be
//! undone: the object is gone and the row is left in place, still marked as
//! not deleted.

use crate::{
    errors::{SaveableError, SaveableResult},
    index::SqliteIndex,
    models::record::Record,
    services::lifecycle::{HookOutcome, LifecycleBinder},
};
use tracing::debug;

#[derive(Clone)]
pub struct RecordRepository {
    index: SqliteIndex,
    binder: LifecycleBinder,
}

impl RecordRepository {
    pub fn new(index: SqliteIndex, binder: LifecycleBinder) -> Self {
        Self { index, binder }
    }

    pub fn binder(&self) -> &LifecycleBinder {
        &self.binder
    }

    pub async fn find(&self, id: i64) -> SaveableResult<Option<Record>> {
        self.index.find(id).await
    }

    /// Upload any attached file, then insert the row.
    pub async fn insert(&self, record: &mut Record) -> SaveableResult<HookOutcome> {
        let outcome = self.binder.on_before_insert(record).await?;
        let id = match self.index.insert_row(record).await {
            Ok(id) => id,
            Err(err) => {
                if outcome == HookOutcome::Applied {
                    self.binder.discard_upload(record).await;
                }
                return Err(err);
            }
        };
        record.id = Some(id);
        debug!(id, ?outcome, "inserted record");
        Ok(outcome)
    }

    /// Relocate if the path changed since the stored row, then write the row.
    pub async fn update(&self, record: &mut Record) -> SaveableResult<HookOutcome> {
        let id = record
            .id
            .ok_or_else(|| SaveableError::validation("record has not been inserted yet"))?;
        let previous = self
            .index
            .find(id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?
            .snapshot();

        let outcome = self.binder.on_before_update(record, &previous).await?;
        if let Err(err) = self.index.update_row(record).await {
            if outcome == HookOutcome::Applied {
                self.binder.revert_relocation(record, &previous).await;
            }
            return Err(err);
        }
        debug!(id, ?outcome, "updated record");
        Ok(outcome)
    }

    /// Delete the stored object, then the row.
    pub async fn delete(&self, record: &mut Record) -> SaveableResult<HookOutcome> {
        if record.id.is_none() {
            return Err(SaveableError::validation("record has not been inserted yet"));
        }
        let outcome = self.binder.on_before_delete(record).await?;
        self.index.delete_row(record).await?;
        debug!(id = ?record.id, ?outcome, "deleted record");
        Ok(outcome)
    }
}

//! SQLite-backed records table.
//!
//! Owns the table holding the storage fields, answers path-collision queries
//! for the uniqueness check, and performs the row writes that the
//! [`RecordRepository`](crate::services::repository::RecordRepository) issues
//! once a lifecycle hook has succeeded. Table and column names come from
//! configuration, so queries are assembled from validated identifiers.

use super::LocalIndex;
use crate::{
    errors::{SaveableError, SaveableResult},
    models::{
        policy::{ColumnMap, validate_identifier},
        record::Record,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::sync::Arc;
use tracing::debug;

const INIT_MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct SqliteIndex {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
    table: String,
    columns: ColumnMap,
}

impl SqliteIndex {
    pub fn new(
        db: Arc<SqlitePool>,
        table: impl Into<String>,
        columns: ColumnMap,
    ) -> SaveableResult<Self> {
        let table = table.into();
        validate_identifier("table", &table)?;
        columns.validate()?;
        Ok(Self { db, table, columns })
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    /// Create the records table for the configured names.
    pub async fn run_migrations(&self) -> SaveableResult<()> {
        let sql = INIT_MIGRATION
            .replace("{table}", &self.table)
            .replace("{path}", &self.columns.path)
            .replace("{is_saved}", &self.columns.is_saved)
            .replace("{is_deleted}", &self.columns.is_deleted);
        let statements = sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    fn select_columns(&self) -> String {
        format!(
            "id, {}, {}, {}",
            self.columns.path, self.columns.is_saved, self.columns.is_deleted
        )
    }

    fn to_record(&self, row: &SqliteRow) -> SaveableResult<Record> {
        Ok(Record::stored(
            Some(row.try_get("id")?),
            row.try_get(self.columns.path.as_str())?,
            row.try_get(self.columns.is_saved.as_str())?,
            row.try_get(self.columns.is_deleted.as_str())?,
        ))
    }

    pub async fn find(&self, id: i64) -> SaveableResult<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            self.select_columns(),
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        row.map(|row| self.to_record(&row)).transpose()
    }

    /// Insert the storage fields and return the new row id.
    pub async fn insert_row(&self, record: &Record) -> SaveableResult<i64> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            self.table, self.columns.path, self.columns.is_saved, self.columns.is_deleted
        );
        let result = sqlx::query(&sql)
            .bind(record.remote_path.as_deref())
            .bind(record.is_saved)
            .bind(record.is_deleted)
            .bind(now)
            .bind(now)
            .execute(&*self.db)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_row(&self, record: &Record) -> SaveableResult<()> {
        let id = require_id(record)?;
        let sql = format!(
            "UPDATE {} SET {} = ?, {} = ?, {} = ?, updated_at = ? WHERE id = ?",
            self.table, self.columns.path, self.columns.is_saved, self.columns.is_deleted
        );
        let result = sqlx::query(&sql)
            .bind(record.remote_path.as_deref())
            .bind(record.is_saved)
            .bind(record.is_deleted)
            .bind(Utc::now())
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound.into());
        }
        Ok(())
    }

    pub async fn delete_row(&self, record: &Record) -> SaveableResult<()> {
        let id = require_id(record)?;
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        sqlx::query(&sql).bind(id).execute(&*self.db).await?;
        Ok(())
    }
}

fn require_id(record: &Record) -> SaveableResult<i64> {
    record
        .id
        .ok_or_else(|| SaveableError::validation("record has not been inserted yet"))
}

#[async_trait]
impl LocalIndex for SqliteIndex {
    async fn count_with_path(&self, path: &str) -> SaveableResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?",
            self.table, self.columns.path
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(path)
            .fetch_one(&*self.db)
            .await?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn index_with(columns: ColumnMap) -> SqliteIndex {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let index = SqliteIndex::new(Arc::new(pool), "uploads", columns).unwrap();
        index.run_migrations().await.unwrap();
        index
    }

    #[tokio::test]
    async fn rows_round_trip_through_custom_columns() {
        let index = index_with(ColumnMap {
            path: "file_key".into(),
            is_saved: "stored".into(),
            is_deleted: "removed".into(),
        })
        .await;

        let mut record = Record::stored(None, Some("docs/a.pdf".into()), true, false);
        record.id = Some(index.insert_row(&record).await.unwrap());

        let loaded = index.find(record.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded.remote_path.as_deref(), Some("docs/a.pdf"));
        assert!(loaded.is_saved);
        assert!(!loaded.is_deleted);
        assert!(loaded.pending().is_none());

        record.set_path("docs/b.pdf");
        index.update_row(&record).await.unwrap();
        assert_eq!(index.count_with_path("docs/a.pdf").await.unwrap(), 0);
        assert_eq!(index.count_with_path("docs/b.pdf").await.unwrap(), 1);

        index.delete_row(&record).await.unwrap();
        assert!(index.find(record.id.unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_without_id_is_rejected() {
        let index = index_with(ColumnMap::default()).await;
        let err = index.update_row(&Record::new()).await.unwrap_err();
        assert!(matches!(err, SaveableError::ValidationFailure(_)));
    }

    #[tokio::test]
    async fn rejects_unsafe_table_name() {
        let pool = SqlitePool::connect_lazy("sqlite::memory:").unwrap();
        let err = SqliteIndex::new(Arc::new(pool), "uploads; --", ColumnMap::default())
            .err()
            .unwrap();
        assert!(matches!(err, SaveableError::ConfigurationInvalid { .. }));
    }
}

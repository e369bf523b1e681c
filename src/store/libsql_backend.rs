//! libSQL record store: summary rows in a local database file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use super::RecordStore;
use crate::digest::SummaryRecord;
use crate::error::{DatabaseError, StoreError};
use crate::store::migrations;

/// libSQL record store.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlRecordStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlRecordStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Record store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

#[async_trait]
impl RecordStore for LibSqlRecordStore {
    fn name(&self) -> &str {
        "libsql"
    }

    async fn append_row(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO summaries (id, timestamp, senders, subjects, bodies, summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.clone(),
                    record.timestamp.to_rfc3339(),
                    record.senders.clone(),
                    record.subjects.clone(),
                    record.bodies.clone(),
                    record.summary.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_row: {e}")))?;

        debug!(id = %id, "Summary row appended");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.conn
            .query("SELECT 1", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("health_check: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn record(summary: &str, minute: u32) -> SummaryRecord {
        SummaryRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).unwrap(),
            senders: "alice@example.com\nbob@example.com".to_string(),
            subjects: "Invoice\nStandup".to_string(),
            bodies: "Pay by Friday\n\nMoved to 10am".to_string(),
            summary: summary.to_string(),
        }
    }

    async fn summaries(store: &LibSqlRecordStore) -> Vec<(String, String, String)> {
        let mut rows = store
            .conn
            .query(
                "SELECT timestamp, bodies, summary FROM summaries ORDER BY rowid",
                (),
            )
            .await
            .unwrap();
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            out.push((
                row.get::<String>(0).unwrap(),
                row.get::<String>(1).unwrap(),
                row.get::<String>(2).unwrap(),
            ));
        }
        out
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let store = LibSqlRecordStore::new_memory().await.unwrap();
        store.append_row(&record("first", 0)).await.unwrap();
        store.append_row(&record("second", 5)).await.unwrap();

        let rows = summaries(&store).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].2, "first");
        assert_eq!(rows[1].2, "second");
        assert_eq!(rows[0].1, "Pay by Friday\n\nMoved to 10am");
        assert_eq!(rows[0].0, record("first", 0).timestamp.to_rfc3339());
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("digest.db");

        {
            let store = LibSqlRecordStore::new_local(&path).await.unwrap();
            store.append_row(&record("kept", 1)).await.unwrap();
        }

        let reopened = LibSqlRecordStore::new_local(&path).await.unwrap();
        let rows = summaries(&reopened).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].2, "kept");
        assert!(reopened.health_check().await.is_ok());
    }
}

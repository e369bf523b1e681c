//! Record store: append-only destination for summary records.

pub mod libsql_backend;
pub mod migrations;
pub mod sheets;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EnvLookup, env_or};
use crate::digest::SummaryRecord;
use crate::error::{ConfigError, StoreError};

pub use libsql_backend::LibSqlRecordStore;
pub use sheets::{SheetsConfig, SheetsRecordStore};

pub const DEFAULT_DB_PATH: &str = "./data/inbox-digest.db";

/// Capability interface: append one row per digest run.
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &str;

    /// Durably append one row. Rows are never updated or deleted.
    async fn append_row(&self, record: &SummaryRecord) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Which record store backend to use.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    LibSql { path: PathBuf },
    Sheets(SheetsConfig),
}

impl StoreConfig {
    /// `DIGEST_STORE_BACKEND` selects `libsql` (default) or `sheets`.
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        match env_or(env, "DIGEST_STORE_BACKEND", "libsql")
            .to_ascii_lowercase()
            .as_str()
        {
            "libsql" => Ok(StoreConfig::LibSql {
                path: PathBuf::from(env_or(env, "DIGEST_DB_PATH", DEFAULT_DB_PATH)),
            }),
            "sheets" => Ok(StoreConfig::Sheets(SheetsConfig::from_lookup(env)?)),
            other => Err(ConfigError::InvalidValue {
                key: "DIGEST_STORE_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected libsql or sheets)"),
            }),
        }
    }
}

/// Open the configured record store.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    match config {
        StoreConfig::LibSql { path } => {
            let store = LibSqlRecordStore::new_local(path).await?;
            Ok(Arc::new(store))
        }
        StoreConfig::Sheets(cfg) => {
            tracing::info!(sheet = %cfg.sheet_name, "Using Google Sheets record store");
            Ok(Arc::new(SheetsRecordStore::new(cfg.clone())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn libsql_is_default() {
        let env = |_: &str| None;
        let config = StoreConfig::from_lookup(&env).unwrap();
        match config {
            StoreConfig::LibSql { path } => assert_eq!(path, PathBuf::from(DEFAULT_DB_PATH)),
            other => panic!("expected libsql, got {other:?}"),
        }
    }

    #[test]
    fn sheets_requires_spreadsheet_id() {
        let env = |k: &str| (k == "DIGEST_STORE_BACKEND").then(|| "sheets".to_string());
        let err = StoreConfig::from_lookup(&env).unwrap_err();
        assert!(err.to_string().contains("SPREADSHEET_ID"));
    }
}

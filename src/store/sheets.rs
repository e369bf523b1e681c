//! Google Sheets record store.
//!
//! Appends one row per run to `{sheet}!A:E`. On the first append of the
//! process the header row is written if the sheet is empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::RecordStore;
use crate::config::{DEFAULT_ADAPTER_TIMEOUT_SECS, EnvLookup, env_or, env_parse, env_required};
use crate::digest::SummaryRecord;
use crate::error::{ConfigError, StoreError};

const DEFAULT_API_BASE: &str = "https://sheets.googleapis.com";

/// Column headers written to an empty sheet.
pub const HEADER_ROW: [&str; 5] = ["Timestamp", "Sender", "Subject", "Email", "Summary"];

/// Google Sheets configuration.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub access_token: SecretString,
    pub api_base: String,
    pub request_timeout: Duration,
}

impl SheetsConfig {
    pub fn from_lookup(env: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let spreadsheet_id = env_required(
            env,
            "SPREADSHEET_ID",
            "Set the id of the spreadsheet shared with the service account",
        )?;
        let token = env_required(
            env,
            "SHEETS_ACCESS_TOKEN",
            "Provide an OAuth access token with the spreadsheets scope",
        )?;
        let timeout: u64 =
            env_parse(env, "DIGEST_ADAPTER_TIMEOUT_SECS", DEFAULT_ADAPTER_TIMEOUT_SECS)?;
        Ok(Self {
            spreadsheet_id,
            sheet_name: env_or(env, "SHEET_NAME", "summary1"),
            access_token: SecretString::from(token),
            api_base: env_or(env, "SHEETS_API_BASE", DEFAULT_API_BASE),
            request_timeout: Duration::from_secs(timeout),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Record store backed by a Google Sheet.
pub struct SheetsRecordStore {
    client: Client,
    config: SheetsConfig,
    header_checked: AtomicBool,
}

impl SheetsRecordStore {
    pub fn new(config: SheetsConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            header_checked: AtomicBool::new(false),
        })
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, StoreError> {
        values_url(&self.config, range, suffix)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = request
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| StoreError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                StoreError::PermissionDenied(format!("{status}: {body}"))
            }
            _ => StoreError::Http(format!("{status}: {body}")),
        })
    }

    async fn append_values(&self, range: &str, row: Vec<String>) -> Result<(), StoreError> {
        let url = self.values_url(range, ":append")?;
        let request = self
            .client
            .post(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&serde_json::json!({ "values": [row] }));
        self.send(request).await?;
        Ok(())
    }

    /// Write the header row once per process if the sheet has none.
    async fn ensure_header(&self) -> Result<(), StoreError> {
        if self.header_checked.load(Ordering::Acquire) {
            return Ok(());
        }

        let header_range = format!("{}!A1:E1", self.config.sheet_name);
        let url = self.values_url(&header_range, "")?;
        let existing: ValueRange = self
            .send(self.client.get(url))
            .await?
            .json()
            .await
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        if existing.values.is_empty() {
            let anchor = format!("{}!A1", self.config.sheet_name);
            self.append_values(&anchor, HEADER_ROW.iter().map(|h| h.to_string()).collect())
                .await?;
            tracing::info!(sheet = %self.config.sheet_name, "Wrote header row to empty sheet");
        }

        self.header_checked.store(true, Ordering::Release);
        Ok(())
    }
}

/// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}`, path-encoded.
pub fn values_url(config: &SheetsConfig, range: &str, suffix: &str) -> Result<Url, StoreError> {
    let mut url = Url::parse(&config.api_base)
        .map_err(|e| StoreError::Http(format!("invalid SHEETS_API_BASE: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::Http("SHEETS_API_BASE cannot be a base URL".to_string()))?
        .pop_if_empty()
        .extend([
            "v4",
            "spreadsheets",
            config.spreadsheet_id.as_str(),
            "values",
            &format!("{range}{suffix}"),
        ]);
    Ok(url)
}

/// The five cells written for one record.
pub fn record_row(record: &SummaryRecord) -> Vec<String> {
    vec![
        record
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        record.senders.clone(),
        record.subjects.clone(),
        record.bodies.clone(),
        record.summary.clone(),
    ]
}

#[async_trait]
impl RecordStore for SheetsRecordStore {
    fn name(&self) -> &str {
        "sheets"
    }

    async fn append_row(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        self.ensure_header().await?;
        let range = format!("{}!A:E", self.config.sheet_name);
        self.append_values(&range, record_row(record)).await?;
        tracing::debug!(sheet = %self.config.sheet_name, "Summary row appended");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| StoreError::Http(format!("invalid SHEETS_API_BASE: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Http("SHEETS_API_BASE cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.config.spreadsheet_id.as_str()]);
        self.send(self.client.get(url).query(&[("fields", "spreadsheetId")]))
            .await?;
        Ok(())
    }
}

//! Ledger sink — append-only tabular store for finalized rows.
//!
//! The production implementation is a Google Sheets `values.append`
//! client. Errors are split into transient (retried by the orchestrator
//! with backoff) and permanent (abort immediately): a 429 or 5xx may
//! resolve on its own, a 403/404 never will.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::SinkError;

const SHEETS_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Appendable tabular store, one row per call.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    /// Append one row at the end of the ledger range. Returns the number
    /// of rows written (expected 1).
    async fn append_row(&self, row: &[String]) -> Result<u32, SinkError>;
}

/// Google Sheets ledger sink.
pub struct SheetsSink {
    token: SecretString,
    spreadsheet_id: String,
    range: String,
    client: reqwest::Client,
}

impl SheetsSink {
    pub fn new(
        token: SecretString,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            token,
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Verify the spreadsheet is reachable before a run starts. A
    /// failure here is a configuration problem, not a per-row one.
    pub async fn verify_connection(&self) -> Result<(), SinkError> {
        let url = format!("{SHEETS_BASE}/{}", self.spreadsheet_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| SinkError::Transient {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SinkError::from_status(status.as_u16(), detail));
        }

        let meta: SpreadsheetMeta = response.json().await.unwrap_or_default();
        info!(
            spreadsheet = %self.spreadsheet_id,
            title = %meta.properties.title,
            "Connected to spreadsheet"
        );
        Ok(())
    }
}

#[async_trait]
impl LedgerSink for SheetsSink {
    async fn append_row(&self, row: &[String]) -> Result<u32, SinkError> {
        let url = format!(
            "{SHEETS_BASE}/{}/values/{}:append",
            self.spreadsheet_id, self.range
        );
        let body = serde_json::json!({ "values": [row] });

        let response = self
            .client
            .post(&url)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::Transient {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SinkError::from_status(status.as_u16(), detail));
        }

        let result: AppendResult =
            response.json().await.map_err(|e| SinkError::Transient {
                reason: format!("malformed append response: {e}"),
            })?;

        debug!(
            range = %result.updates.updated_range,
            rows = result.updates.updated_rows,
            "Appended ledger row"
        );
        Ok(result.updates.updated_rows)
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct AppendResult {
    #[serde(default)]
    updates: AppendUpdates,
}

#[derive(Debug, Default, Deserialize)]
struct AppendUpdates {
    #[serde(rename = "updatedRows", default)]
    updated_rows: u32,
    #[serde(rename = "updatedRange", default)]
    updated_range: String,
}

#[derive(Debug, Default, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    properties: SpreadsheetProperties,
}

#[derive(Debug, Default, Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_result_parses_update_counts() {
        let raw = r#"{
            "updates": { "updatedRows": 1, "updatedRange": "Sheet1!A5:F5" }
        }"#;
        let result: AppendResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.updates.updated_rows, 1);
        assert_eq!(result.updates.updated_range, "Sheet1!A5:F5");
    }

    #[test]
    fn append_result_tolerates_missing_updates() {
        let result: AppendResult = serde_json::from_str("{}").unwrap();
        assert_eq!(result.updates.updated_rows, 0);
    }
}

//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Gmail query matching unread BCR transaction notifications
/// (card purchases and SINPE mobile transfers).
pub const DEFAULT_SEARCH_QUERY: &str = "(subject:\"Notificación de Transacciones BCR\" OR \
     subject:\"SINPEMOVIL - Notificación de transacción realizada\") is:unread";

/// Sheet range covering the persisted row layout:
/// date, reference, amount, merchant, category, status.
pub const DEFAULT_SHEET_RANGE: &str = "A:F";

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";

/// Sync pipeline configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// OAuth bearer access token for the Gmail and Sheets APIs.
    pub google_token: SecretString,
    /// API key for the Gemini categorization oracle.
    pub gemini_api_key: SecretString,
    /// Target spreadsheet identifier.
    pub spreadsheet_id: String,
    /// Search filter for unread transaction notifications.
    pub search_query: String,
    /// Sheet range rows are appended to.
    pub sheet_range: String,
    /// Oracle model name.
    pub gemini_model: String,
    /// Maximum ledger append attempts per message.
    pub append_max_attempts: u32,
    /// Base delay for the append backoff (doubles per attempt).
    pub append_base_delay: Duration,
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// `GOOGLE_TOKEN`, `GEMINI_API_KEY` and `SPREADSHEET_ID` are required;
    /// everything else has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            google_token: SecretString::from(require_env("GOOGLE_TOKEN")?),
            gemini_api_key: SecretString::from(require_env("GEMINI_API_KEY")?),
            spreadsheet_id: require_env("SPREADSHEET_ID")?,
            search_query: std::env::var("BCR_SEARCH_QUERY")
                .unwrap_or_else(|_| DEFAULT_SEARCH_QUERY.to_string()),
            sheet_range: std::env::var("BCR_SHEET_RANGE")
                .unwrap_or_else(|_| DEFAULT_SHEET_RANGE.to_string()),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            append_max_attempts: parse_env("BCR_APPEND_MAX_ATTEMPTS", 3)?,
            append_base_delay: Duration::from_millis(parse_env(
                "BCR_APPEND_BASE_DELAY_MS",
                2000,
            )?),
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a valid value"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query_targets_both_notification_subjects() {
        assert!(DEFAULT_SEARCH_QUERY.contains("Notificación de Transacciones BCR"));
        assert!(DEFAULT_SEARCH_QUERY.contains("SINPEMOVIL"));
        assert!(DEFAULT_SEARCH_QUERY.contains("is:unread"));
    }
}

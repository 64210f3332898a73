//! Core data types flowing through the sync pipeline.

use serde::{Deserialize, Serialize};

/// One unread notification message fetched from the source.
///
/// Read-only input; the only mutation the pipeline ever performs is the
/// mark-as-read acknowledgment, and only after a confirmed ledger append.
#[derive(Debug, Clone)]
pub struct CandidateMessage {
    /// Opaque, stable message identifier.
    pub id: String,
    /// Subject line, when the source exposes one.
    pub subject: Option<String>,
    /// Raw body content, HTML or plain text.
    pub body: String,
    /// Unread flag as reported by the source.
    pub is_unread: bool,
}

/// A normalized transaction record extracted from a notification body.
///
/// All fields are pass-through strings in source format; downstream
/// consumers parse amounts/dates if they need to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Source-format timestamp, e.g. `22/01/2024 14:30:45`.
    pub date: String,
    /// Authorization code; absent in SINPE transfer variants.
    pub authorization: Option<String>,
    /// Transaction/trace number.
    pub reference: String,
    /// Decimal amount as printed.
    pub amount: String,
    /// Currency name; not always recoverable.
    pub currency: Option<String>,
    /// Counterparty: store name, or SINPE sender/recipient identity.
    pub merchant: String,
    /// Transaction status, e.g. `Aprobada`.
    pub status: String,
}

impl TransactionRecord {
    /// Validity invariant: a merchant, at least one of reference or
    /// authorization, and a recognizable timestamp. Extraction never
    /// returns a record that fails this.
    pub fn is_valid(&self) -> bool {
        let has_trace = !self.reference.is_empty()
            || self.authorization.as_deref().is_some_and(|a| !a.is_empty());
        !self.merchant.is_empty() && has_trace && has_timestamp_shape(&self.date)
    }

    /// Ledger row in the persisted column order:
    /// date, reference, amount, merchant, category, status.
    ///
    /// Authorization and currency are captured but not part of the row
    /// contract; changing this order requires a sheet migration.
    pub fn to_row(&self, category: &str) -> Vec<String> {
        vec![
            self.date.clone(),
            self.reference.clone(),
            self.amount.clone(),
            self.merchant.clone(),
            category.to_string(),
            self.status.clone(),
        ]
    }
}

/// Whether a string looks like a `DD/MM/YYYY HH:MM:SS` timestamp
/// (date-only accepted).
pub fn has_timestamp_shape(s: &str) -> bool {
    let s = s.trim();
    chrono::NaiveDateTime::parse_from_str(s, "%d/%m/%Y %H:%M:%S").is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%d/%m/%Y").is_ok()
}

/// Aggregated result of one orchestration pass. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Messages appended to the ledger and acknowledged.
    pub processed: usize,
    /// Messages skipped (parse failure or exhausted append retries).
    pub failed: usize,
    /// Messages fetched this run.
    pub total: usize,
}

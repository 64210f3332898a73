//! Transaction extractor — raw notification body → `TransactionRecord`.
//!
//! Two ordered strategies, first success wins:
//! 1. Tabular: scan `<tbody>` blocks for the canonical 7-cell layout
//! 2. Fallback text: strip all markup, anchor on the timestamp, recover
//!    fields from known Spanish labels
//!
//! The bank's template is not under our control; some mail clients also
//! strip the HTML down to plain text, so both renderings must parse
//! without the caller knowing which variant arrived.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::ParseError;
use crate::pipeline::types::TransactionRecord;

/// Cell count of the canonical tabular layout: date, authorization,
/// reference, amount, currency, merchant, status.
///
/// Qualification is by count alone — the template carries no usable
/// column labels. If the bank adds or removes a column the parser fails
/// outright rather than guessing a mapping.
pub const EXPECTED_FIELD_COUNT: usize = 7;

fn tbody_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<tbody\b[^>]*>(.*?)</tbody>").unwrap())
}

fn td_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<td\b[^>]*>(.*?)</td>").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{2}/\d{2}/\d{4}\s+\d{2}:\d{2}:\d{2}").unwrap())
}

fn sinpe_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)esta transacci[óo]n fue realizada el\s*(\d{1,2}/\d{2}/\d{4})\s*a las\s*(\d{1,2}):(\d{2})\s*(AM|PM)?",
        )
        .unwrap()
    })
}

/// Extract a transaction record from a notification body.
pub fn extract(body: &str) -> Result<TransactionRecord, ParseError> {
    if body.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }

    if let Some(cells) = find_transaction_block(body) {
        debug!("Extracted via tabular strategy");
        let record = record_from_cells(cells);
        return if record.is_valid() {
            Ok(record)
        } else {
            Err(ParseError::IncompleteData)
        };
    }

    extract_from_text(body)
}

/// Normalize one cell of text: strip markup, collapse non-breaking
/// spaces to plain spaces, collapse whitespace runs, trim.
///
/// Idempotent: cleaning cleaned text is a no-op.
pub fn clean_cell(text: &str) -> String {
    let text = tag_re().replace_all(text, " ");
    let text = text.replace('\u{a0}', " ").replace("&nbsp;", " ");
    whitespace_re().replace_all(&text, " ").trim().to_string()
}

// ── Tabular strategy ────────────────────────────────────────────────

/// Scan every `<tbody>` block in document order and return the cleaned
/// cells of the first block with exactly the expected field count.
fn find_transaction_block(body: &str) -> Option<Vec<String>> {
    for block in tbody_re().captures_iter(body) {
        let cells: Vec<String> = td_re()
            .captures_iter(&block[1])
            .map(|cell| clean_cell(&cell[1]))
            .filter(|text| !text.is_empty())
            .collect();

        if cells.len() == EXPECTED_FIELD_COUNT {
            return Some(cells);
        }
    }
    None
}

/// Positional mapping for the canonical layout.
fn record_from_cells(mut cells: Vec<String>) -> TransactionRecord {
    debug_assert_eq!(cells.len(), EXPECTED_FIELD_COUNT);
    let status = cells.pop().unwrap_or_default();
    let merchant = cells.pop().unwrap_or_default();
    let currency = cells.pop().unwrap_or_default();
    let amount = cells.pop().unwrap_or_default();
    let reference = cells.pop().unwrap_or_default();
    let authorization = cells.pop().unwrap_or_default();
    let date = cells.pop().unwrap_or_default();

    TransactionRecord {
        date,
        authorization: Some(authorization),
        reference,
        amount,
        currency: Some(currency),
        merchant,
        status,
    }
}

// ── Fallback text strategy ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Authorization,
    Reference,
    Amount,
    Currency,
    Merchant,
    Status,
}

/// A label-anchored extraction rule: the label token, and how many
/// following whitespace tokens constitute the value.
struct LabelRule {
    field: Field,
    label: &'static str,
    max_tokens: usize,
}

/// Ordered rules covering the plain-text card rendering and the SINPE
/// transfer variant. First match per field wins.
const LABEL_RULES: &[LabelRule] = &[
    LabelRule { field: Field::Authorization, label: "autorización", max_tokens: 1 },
    LabelRule { field: Field::Authorization, label: "autorizacion", max_tokens: 1 },
    LabelRule { field: Field::Reference, label: "número de referencia", max_tokens: 1 },
    LabelRule { field: Field::Reference, label: "numero de referencia", max_tokens: 1 },
    LabelRule { field: Field::Reference, label: "referencia", max_tokens: 1 },
    LabelRule { field: Field::Amount, label: "monto", max_tokens: 1 },
    LabelRule { field: Field::Currency, label: "moneda", max_tokens: 3 },
    LabelRule { field: Field::Merchant, label: "comercio", max_tokens: 6 },
    LabelRule { field: Field::Merchant, label: "nombre cliente destino", max_tokens: 5 },
    LabelRule { field: Field::Merchant, label: "nombre cliente origen", max_tokens: 5 },
    LabelRule { field: Field::Status, label: "estado", max_tokens: 1 },
];

/// Labels that terminate a value, including SINPE fields we do not
/// extract but must not swallow into a preceding value.
const CUT_LABELS: &[&str] = &[
    "autorización",
    "autorizacion",
    "número de referencia",
    "numero de referencia",
    "referencia",
    "monto",
    "moneda",
    "comercio",
    "nombre cliente destino",
    "nombre cliente origen",
    "estado",
    "entidad",
    "teléfono",
    "telefono",
    "motivo",
    "esta transacción",
    "esta transaccion",
    "fecha",
];

/// Strip all markup from the body, locate the transaction timestamp, and
/// recover whatever fields the label rules can find around it.
fn extract_from_text(body: &str) -> Result<TransactionRecord, ParseError> {
    let text = clean_cell(body);

    let Some(date) = find_timestamp(&text) else {
        return Err(ParseError::NoTransactionData);
    };
    debug!("Extracted via fallback text strategy");

    let lower = fold_for_search(&text);
    let mut record = TransactionRecord {
        date,
        ..Default::default()
    };

    for rule in LABEL_RULES {
        if field_is_set(&record, rule.field) {
            continue;
        }
        if let Some(value) = extract_labeled_value(&text, &lower, rule) {
            set_field(&mut record, rule.field, value);
        }
    }

    if record.is_valid() {
        Ok(record)
    } else {
        Err(ParseError::IncompleteData)
    }
}

/// Locate the transaction timestamp, normalized to
/// `DD/MM/YYYY HH:MM:SS`. Card notifications carry it verbatim; SINPE
/// transfers spell it out as "Esta transacción fue realizada el
/// DD/MM/YYYY a las H:MM PM", which needs a 24-hour conversion.
fn find_timestamp(text: &str) -> Option<String> {
    if let Some(m) = timestamp_re().find(text) {
        return Some(whitespace_re().replace_all(m.as_str(), " ").into_owned());
    }

    let caps = sinpe_date_re().captures(text)?;
    let mut hour: u32 = caps[2].parse().ok()?;
    match caps.get(4).map(|m| m.as_str().to_ascii_uppercase()) {
        Some(p) if p == "PM" && hour != 12 => hour += 12,
        Some(p) if p == "AM" && hour == 12 => hour = 0,
        _ => {}
    }
    Some(format!("{} {hour:02}:{}:00", &caps[1], &caps[3]))
}

fn field_is_set(record: &TransactionRecord, field: Field) -> bool {
    match field {
        Field::Authorization => record.authorization.is_some(),
        Field::Reference => !record.reference.is_empty(),
        Field::Amount => !record.amount.is_empty(),
        Field::Currency => record.currency.is_some(),
        Field::Merchant => !record.merchant.is_empty(),
        Field::Status => !record.status.is_empty(),
    }
}

fn set_field(record: &mut TransactionRecord, field: Field, value: String) {
    match field {
        Field::Authorization => record.authorization = Some(value),
        Field::Reference => record.reference = value,
        Field::Amount => record.amount = value,
        Field::Currency => record.currency = Some(value),
        Field::Merchant => record.merchant = value,
        Field::Status => record.status = value,
    }
}

/// Lowercase `text` for label matching without changing byte offsets:
/// characters whose lowercase form has a different UTF-8 length are kept
/// as-is. Spanish-alphabet characters all fold 1:1.
fn fold_for_search(text: &str) -> String {
    text.chars()
        .map(|c| {
            let mut folded = c.to_lowercase();
            match (folded.next(), folded.next()) {
                (Some(l), None) if l.len_utf8() == c.len_utf8() => l,
                _ => c,
            }
        })
        .collect()
}

/// Find `rule.label` case-insensitively and take up to `rule.max_tokens`
/// tokens after it, cutting at the next known label.
///
/// `lower` must be the offset-preserving fold of `text`, so indices
/// found in `lower` are valid into `text`.
fn extract_labeled_value(text: &str, lower: &str, rule: &LabelRule) -> Option<String> {
    let label_start = lower.find(rule.label)?;
    let after_label = label_start + rule.label.len();

    let mut rest = &text[after_label..];
    rest = rest.trim_start();
    rest = rest.strip_prefix(':').unwrap_or(rest).trim_start();

    // Cut at the earliest occurrence of any other known label.
    let rest_lower = &lower[lower.len() - rest.len()..];
    let cut = CUT_LABELS
        .iter()
        .filter_map(|label| rest_lower.find(label))
        .min()
        .unwrap_or(rest.len());

    let value: Vec<&str> = rest[..cut]
        .split_whitespace()
        .take(rule.max_tokens)
        .collect();
    let value = value.join(" ");

    if value.is_empty() { None } else { Some(value) }
}

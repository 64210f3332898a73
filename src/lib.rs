//! BCR Sync — bank transaction notifications to a spreadsheet ledger.
//!
//! One scheduled activation per run: list unread notification emails,
//! extract a transaction record from each, assign a spending category,
//! append a row to the ledger, and mark the email read. Durability lives
//! entirely in the source's unread flag and the external ledger.

pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod oracle;
pub mod pipeline;
pub mod retry;
pub mod sink;
pub mod source;

//! End-to-end pipeline tests with in-memory collaborators.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use bcr_sync::classify::{CategoryScheme, Classifier};
use bcr_sync::error::{OracleError, SinkError, SourceError};
use bcr_sync::oracle::CategoryOracle;
use bcr_sync::pipeline::types::CandidateMessage;
use bcr_sync::pipeline::SyncRunner;
use bcr_sync::retry::RetryPolicy;
use bcr_sync::sink::LedgerSink;
use bcr_sync::source::MessageSource;

/// Oracle that panics if reached — every merchant in these fixtures must
/// resolve via the keyword phase.
struct UnreachableOracle;

#[async_trait]
impl CategoryOracle for UnreachableOracle {
    async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        panic!("oracle must not be called");
    }
}

/// In-memory message source tracking read flags, with optional
/// acknowledgment failure injection.
struct MemorySource {
    messages: Mutex<Vec<CandidateMessage>>,
    fail_ack_for: Mutex<HashSet<String>>,
}

impl MemorySource {
    fn new(messages: Vec<CandidateMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
            fail_ack_for: Mutex::new(HashSet::new()),
        }
    }

    fn fail_ack(&self, id: &str) {
        self.fail_ack_for.lock().unwrap().insert(id.to_string());
    }

    fn unread_ids(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.is_unread)
            .map(|m| m.id.clone())
            .collect()
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn list_unread(&self) -> Result<Vec<CandidateMessage>, SourceError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.is_unread)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: &str) -> Result<(), SourceError> {
        if self.fail_ack_for.lock().unwrap().remove(id) {
            return Err(SourceError::AckFailed {
                id: id.to_string(),
                reason: "simulated outage".into(),
            });
        }
        let mut messages = self.messages.lock().unwrap();
        if let Some(message) = messages.iter_mut().find(|m| m.id == id) {
            message.is_unread = false;
        }
        Ok(())
    }
}

/// In-memory ledger recording every appended row.
struct MemorySink {
    rows: Mutex<Vec<Vec<String>>>,
}

impl MemorySink {
    fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerSink for MemorySink {
    async fn append_row(&self, row: &[String]) -> Result<u32, SinkError> {
        self.rows.lock().unwrap().push(row.to_vec());
        Ok(1)
    }
}

fn card_html(merchant: &str, reference: &str) -> String {
    format!(
        "<html><body><table><tbody><tr>\
         <td>22/01/2024 14:30:45</td>\
         <td>123456</td>\
         <td>{reference}</td>\
         <td>15000.00</td>\
         <td>CRC</td>\
         <td>{merchant}</td>\
         <td>Aprobada</td>\
         </tr></tbody></table></body></html>"
    )
}

fn message(id: &str, body: impl Into<String>) -> CandidateMessage {
    CandidateMessage {
        id: id.into(),
        subject: Some("Notificación de Transacciones BCR".into()),
        body: body.into(),
        is_unread: true,
    }
}

fn runner(source: Arc<MemorySource>, sink: Arc<MemorySink>) -> SyncRunner {
    SyncRunner::new(
        source,
        Classifier::new(CategoryScheme::bcr_default(), Arc::new(UnreachableOracle)),
        sink,
        RetryPolicy::immediate(3),
    )
}

#[tokio::test]
async fn end_to_end_row_matches_ledger_contract() {
    let source = Arc::new(MemorySource::new(vec![message(
        "m1",
        card_html("MAS X MENOS", "789012"),
    )]));
    let sink = Arc::new(MemorySink::new());

    let outcome = runner(source.clone(), sink.clone()).run().await.unwrap();

    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(
        sink.rows(),
        vec![vec![
            "22/01/2024 14:30:45".to_string(),
            "789012".to_string(),
            "15000.00".to_string(),
            "MAS X MENOS".to_string(),
            "Mercado (alimentos, aseo hogar)".to_string(),
            "Aprobada".to_string(),
        ]]
    );
    assert!(source.unread_ids().is_empty());
}

#[tokio::test]
async fn malformed_message_does_not_poison_the_batch() {
    let source = Arc::new(MemorySource::new(vec![
        message("m1", card_html("MAS X MENOS", "111111")),
        message("m2", "<p>Estimado cliente, su estado de cuenta está listo.</p>"),
        message("m3", card_html("SUPER LA FERIA", "333333")),
    ]));
    let sink = Arc::new(MemorySink::new());

    let outcome = runner(source.clone(), sink.clone()).run().await.unwrap();

    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.total, 3);

    // The malformed message stays unread for a future run.
    assert_eq!(source.unread_ids(), vec!["m2"]);

    let rows = sink.rows();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][3], "MAS X MENOS");
    assert_eq!(rows[1][3], "SUPER LA FERIA");
}

#[tokio::test]
async fn ack_failure_duplicates_on_rerun_but_never_loses_a_row() {
    let source = Arc::new(MemorySource::new(vec![message(
        "m1",
        card_html("MAS X MENOS", "789012"),
    )]));
    let sink = Arc::new(MemorySink::new());

    // First run: append succeeds, acknowledgment fails.
    source.fail_ack("m1");
    let outcome = runner(source.clone(), sink.clone()).run().await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(sink.rows().len(), 1);
    assert_eq!(source.unread_ids(), vec!["m1"]);

    // Second run: the message is still unread, so it is reprocessed and
    // the row duplicated — accepted, as the alternative is losing it.
    let outcome = runner(source.clone(), sink.clone()).run().await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(sink.rows().len(), 2);
    assert_eq!(sink.rows()[0], sink.rows()[1]);
    assert!(source.unread_ids().is_empty());
}

#[tokio::test]
async fn plain_text_rendering_flows_through_fallback_strategy() {
    let body = "Notificación de Transacciones BCR \
                Fecha: 22/01/2024 14:30:45 Autorización: 123456 \
                No. Referencia: 789012 Monto: 15000.00 Moneda: CRC \
                Comercio: SUPER LA FERIA Estado: Aprobada";
    let source = Arc::new(MemorySource::new(vec![message("m1", body)]));
    let sink = Arc::new(MemorySink::new());

    let outcome = runner(source.clone(), sink.clone()).run().await.unwrap();

    assert_eq!(outcome.processed, 1);
    let rows = sink.rows();
    assert_eq!(rows[0][3], "SUPER LA FERIA");
    assert_eq!(rows[0][4], "Mercado (alimentos, aseo hogar)");
    assert!(source.unread_ids().is_empty());
}

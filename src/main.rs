use std::sync::Arc;

use bcr_sync::classify::{CategoryScheme, Classifier};
use bcr_sync::config::SyncConfig;
use bcr_sync::oracle::GeminiOracle;
use bcr_sync::pipeline::SyncRunner;
use bcr_sync::retry::RetryPolicy;
use bcr_sync::sink::SheetsSink;
use bcr_sync::source::GmailSource;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("BCR Sync v{} starting", env!("CARGO_PKG_VERSION"));

    let config = SyncConfig::from_env().map_err(|e| {
        error!("{e}");
        anyhow::anyhow!("configuration error: {e}")
    })?;

    let source = Arc::new(GmailSource::new(
        config.google_token.clone(),
        config.search_query.clone(),
    ));
    let oracle = Arc::new(GeminiOracle::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    ));
    let classifier = Classifier::new(CategoryScheme::bcr_default(), oracle);
    let sink = Arc::new(SheetsSink::new(
        config.google_token.clone(),
        config.spreadsheet_id.clone(),
        config.sheet_range.clone(),
    ));

    // Fail fast on a misconfigured or unreachable spreadsheet.
    sink.verify_connection()
        .await
        .map_err(|e| anyhow::anyhow!("ledger sink unavailable: {e}"))?;

    let runner = SyncRunner::new(
        source,
        classifier,
        sink,
        RetryPolicy {
            max_attempts: config.append_max_attempts,
            base_delay: config.append_base_delay,
        },
    );

    let outcome = runner
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("sync run aborted: {e}"))?;

    info!(
        processed = outcome.processed,
        failed = outcome.failed,
        total = outcome.total,
        "Sync complete"
    );

    // Scheduled runs alert on non-zero exit; a partially failed batch
    // still processed what it could, but must surface the failures.
    if outcome.failed > 0 {
        anyhow::bail!("{} of {} messages failed", outcome.failed, outcome.total);
    }
    Ok(())
}

//! One-shot CCS batch run: submits queued detailing requests, then harvests
//! pending responses. Meant to be scheduled (cron, systemd timer).

use rust_bacen_api::ccs_workflow::CcsWorkflow;
use rust_bacen_api::config::Config;
use rust_bacen_api::db::Database;
use rust_bacen_api::models::DetailingResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_bacen_api=info,ccs_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    let workflow = CcsWorkflow::from_config(&config, db.pool.clone())?;

    let results = workflow.process_queue().await?;
    let submitted = results
        .iter()
        .filter(|r| r.status == DetailingResult::SUCCESS)
        .count();
    tracing::info!(
        "Queue run finished: {} messages, {} submitted",
        results.len(),
        submitted
    );
    for result in &results {
        tracing::debug!(
            "{}: {} ({})",
            result.bank.as_deref().unwrap_or("-"),
            result.message,
            result.status
        );
    }

    let summary = workflow.harvest_responses().await?;
    tracing::info!(
        "Harvest finished: {} checked, {} completed, {} pending, {} failed",
        summary.checked,
        summary.completed,
        summary.pending,
        summary.failed
    );

    db.pool.close().await;
    Ok(())
}

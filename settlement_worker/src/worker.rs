use log::*;
use settlement_engine::{PayoutApi, RefundApi, SqliteDatabase};

use crate::{
    batch_worker::{start_payout_worker, start_reconciliation_worker, start_refund_retry_worker},
    config::WorkerConfig,
    errors::WorkerError,
    gateway::HttpGateway,
    notifications::create_notification_handlers,
};

/// Runs the payout batch, the refund sweep and the gateway reconciliation sweep until the process receives Ctrl-C.
pub async fn run_worker(config: WorkerConfig) -> Result<(), WorkerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections)
        .await
        .map_err(|e| WorkerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| WorkerError::InitializeError(e.to_string()))?;
    }
    let gateway = HttpGateway::new(&config.gateway)?;
    let handlers = create_notification_handlers();
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let payout_api = PayoutApi::new(db.clone(), gateway.clone(), producers.clone());
    let refund_api = RefundApi::new(db, gateway, producers);
    info!(
        "🕰️ Payout batch every {}s, refund sweep every {}s, gateway reconciliation every {}s",
        config.batch_interval.as_secs(),
        config.refund_retry_interval.as_secs(),
        config.reconcile_interval.as_secs()
    );
    let reconciliation =
        start_reconciliation_worker(refund_api.clone(), payout_api.clone(), config.reconcile_interval);
    let payouts = start_payout_worker(payout_api, config.batch_interval);
    let refunds = start_refund_retry_worker(refund_api, config.refund_retry_interval);

    tokio::signal::ctrl_c().await?;
    info!("🕰️ Shutting down");
    payouts.abort();
    refunds.abort();
    reconciliation.abort();
    Ok(())
}

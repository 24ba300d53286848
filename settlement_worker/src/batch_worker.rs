use std::time::Duration;

use chrono::{DateTime, Utc};
use log::*;
use settlement_engine::{
    db_types::{OrderRefund, PayoutPeriod, SellerPayout},
    traits::{BatchResult, DispatchResult, ReconciliationResult},
    PaymentGateway,
    PayoutApi,
    RefundApi,
    SettlementDatabase,
    SettlementError,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

use crate::gateway::HttpGateway;

/// Starts the payout batch worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_payout_worker(api: PayoutApi<SqliteDatabase, HttpGateway>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Payout batch worker started");
        loop {
            timer.tick().await;
            // Errors are logged by the batch; the next tick tries again
            let _ = run_payout_batch(&api, Utc::now()).await;
        }
    })
}

/// Generates the payouts for the month containing `as_of`, for every seller with unsettled items.
pub async fn run_payout_batch<B, G>(api: &PayoutApi<B, G>, as_of: DateTime<Utc>) -> Result<BatchResult, SettlementError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    let period = PayoutPeriod::containing(as_of);
    info!("🕰️ Running the {period} payout batch");
    match api.generate_all(period, as_of).await {
        Ok(result) => {
            info!("🕰️ {} payouts generated for {period}", result.generated.len());
            debug!("🕰️ New payouts: {}", payout_list(&result.generated));
            debug!("🕰️ {} sellers had already been paid out for {period}", result.already_existed.len());
            debug!("🕰️ {} sellers had nothing to settle", result.nothing_to_settle.len());
            for (seller, e) in &result.failed {
                warn!("🕰️ Could not generate the {period} payout for {seller}. {e}");
            }
            Ok(result)
        },
        Err(e) => {
            error!("🕰️ Error running the {period} payout batch: {e}");
            Err(e)
        },
    }
}

/// Starts the refund dispatch worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_refund_retry_worker(api: RefundApi<SqliteDatabase, HttpGateway>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Refund dispatch worker started");
        loop {
            timer.tick().await;
            let _ = run_refund_sweep(&api).await;
        }
    })
}

/// Sends every refund that is still waiting for the gateway.
pub async fn run_refund_sweep<B, G>(api: &RefundApi<B, G>) -> Result<DispatchResult, SettlementError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    trace!("🕰️ Running the refund dispatch sweep");
    match api.retry_pending_refunds().await {
        Ok(result) => {
            if !result.dispatched.is_empty() {
                info!("🕰️ {} refunds dispatched: {}", result.dispatched.len(), refund_list(&result.dispatched));
            }
            if !result.rejected.is_empty() {
                warn!("🕰️ {} refunds were refused by the gateway: {}", result.rejected.len(), refund_list(&result.rejected));
            }
            if !result.failed.is_empty() {
                warn!("🕰️ {} refunds are still waiting for the gateway", result.failed.len());
            }
            Ok(result)
        },
        Err(e) => {
            error!("🕰️ Error running the refund dispatch sweep: {e}");
            Err(e)
        },
    }
}

/// Starts the gateway reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_reconciliation_worker(
    refunds: RefundApi<SqliteDatabase, HttpGateway>,
    payouts: PayoutApi<SqliteDatabase, HttpGateway>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Gateway reconciliation worker started");
        loop {
            timer.tick().await;
            let _ = run_reconciliation_sweep(&refunds, &payouts).await;
        }
    })
}

/// Asks the gateway how the refunds and disbursements it accepted have turned out, and records the final outcomes.
/// Returns the refund result and the disbursement result, in that order.
pub async fn run_reconciliation_sweep<B, G>(
    refunds: &RefundApi<B, G>,
    payouts: &PayoutApi<B, G>,
) -> Result<(ReconciliationResult, ReconciliationResult), SettlementError>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    trace!("🕰️ Running the gateway reconciliation sweep");
    let refund_result = refunds.poll_processing_refunds().await.map_err(|e| {
        error!("🕰️ Error reconciling refunds: {e}");
        e
    })?;
    let payout_result = payouts.poll_unconfirmed_disbursements().await.map_err(|e| {
        error!("🕰️ Error reconciling disbursements: {e}");
        e
    })?;
    for (kind, result) in [("refunds", &refund_result), ("disbursements", &payout_result)] {
        if result.settled_count() > 0 {
            info!(
                "🕰️ {} {kind} completed, {} failed, {} still in progress",
                result.completed.len(),
                result.failed.len(),
                result.in_progress.len()
            );
        }
        if !result.errors.is_empty() {
            warn!("🕰️ {} {kind} could not be checked with the gateway", result.errors.len());
        }
    }
    Ok((refund_result, payout_result))
}

fn payout_list(payouts: &[SellerPayout]) -> String {
    payouts
        .iter()
        .map(|p| format!("[{}] seller: {} net: {}", p.id, p.seller_id, p.net_amount))
        .collect::<Vec<String>>()
        .join(", ")
}

fn refund_list(refunds: &[OrderRefund]) -> String {
    refunds
        .iter()
        .map(|r| format!("[{}] item: {} amount: {}", r.id, r.order_item_id, r.amount))
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod test {
    use chrono::Duration;
    use settlement_engine::{
        db_types::{Actor, GatewayOutcome, NewOrderItem, OrderItem, OrderItemStatus, RefundStatus, SellerId},
        events::EventProducers,
        test_utils::{
            mock_gateway::MockGateway,
            prepare_env::{prepare_test_env, random_db_path},
        },
        OrderFlowApi,
        SettlementConfig,
    };
    use settlement_common::Paise;

    use super::*;

    async fn new_db() -> SqliteDatabase {
        let url = random_db_path();
        prepare_test_env(&url).await;
        SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
    }

    async fn place(orders: &OrderFlowApi<SqliteDatabase, MockGateway>, order_id: &str) -> OrderItem {
        let item = NewOrderItem::new(order_id, SellerId::from("s1"), "listing-1", 1, Paise::from_rupees(500));
        orders.place_order_item(item, &Actor::buyer("b1")).await.unwrap()
    }

    #[tokio::test]
    async fn batch_is_idempotent_within_a_month() {
        let db = new_db().await;
        let gateway = MockGateway::new();
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), EventProducers::default(), SettlementConfig::default());
        let item = place(&orders, "ord-1").await;
        let seller = Actor::seller("s1");
        let steps = [
            (OrderItemStatus::Pending, OrderItemStatus::Confirmed),
            (OrderItemStatus::Confirmed, OrderItemStatus::Packed),
            (OrderItemStatus::Packed, OrderItemStatus::Shipped),
        ];
        for (from, to) in steps {
            orders.transition(item.id, from, to, &seller, None).await.unwrap();
        }
        let delivered_at = Utc::now() - Duration::days(10);
        orders.deliver_at(item.id, OrderItemStatus::Shipped, &Actor::system(), None, delivered_at).await.unwrap();

        let api = PayoutApi::new(db.clone(), gateway, EventProducers::default());
        let now = Utc::now();
        let first = run_payout_batch(&api, now).await.unwrap();
        assert_eq!(first.generated.len(), 1);
        assert_eq!(first.generated[0].net_amount, Paise::from_rupees(500));
        assert_eq!(first.generated[0].period(), PayoutPeriod::containing(now));
        let second = run_payout_batch(&api, now).await.unwrap();
        assert!(second.generated.is_empty());
        assert_eq!(second.already_existed.len(), 1);
        assert_eq!(second.already_existed[0].id, first.generated[0].id);
    }

    #[tokio::test]
    async fn sweep_dispatches_refunds_once_the_gateway_is_back() {
        let db = new_db().await;
        let gateway = MockGateway::new();
        gateway.set_offline(true);
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), EventProducers::default(), SettlementConfig::default());
        let item = place(&orders, "ord-1").await;
        orders.cancel(item.id, OrderItemStatus::Pending, &Actor::buyer("b1"), None).await.unwrap();

        let api = RefundApi::new(db.clone(), gateway.clone(), EventProducers::default());
        let result = run_refund_sweep(&api).await.unwrap();
        assert!(result.dispatched.is_empty());
        assert_eq!(result.failed.len(), 1);

        gateway.set_offline(false);
        let result = run_refund_sweep(&api).await.unwrap();
        assert_eq!(result.dispatched.len(), 1);
        assert_eq!(result.dispatched[0].status, RefundStatus::Processing);
        assert_eq!(gateway.refunds().len(), 1);
        let result = run_refund_sweep(&api).await.unwrap();
        assert!(result.dispatched.is_empty() && result.failed.is_empty());
    }

    #[tokio::test]
    async fn reconciliation_applies_the_gateway_outcomes() {
        let db = new_db().await;
        let gateway = MockGateway::new();
        let producers = EventProducers::default();
        let orders = OrderFlowApi::new(db.clone(), gateway.clone(), producers.clone(), SettlementConfig::default());
        let first = place(&orders, "ord-1").await;
        let second = place(&orders, "ord-2").await;
        let buyer = Actor::buyer("b1");
        let first = orders.cancel(first.id, OrderItemStatus::Pending, &buyer, None).await.unwrap();
        let second = orders.cancel(second.id, OrderItemStatus::Pending, &buyer, None).await.unwrap();
        let first_refund = first.refund.refund().clone();
        let second_refund = second.refund.refund().clone();
        assert_eq!(first_refund.status, RefundStatus::Processing);

        let refunds = RefundApi::new(db.clone(), gateway.clone(), producers.clone());
        let payouts = PayoutApi::new(db.clone(), gateway.clone(), producers);
        let (refund_result, payout_result) = run_reconciliation_sweep(&refunds, &payouts).await.unwrap();
        assert_eq!(refund_result.in_progress.len(), 2);
        assert_eq!(refund_result.settled_count(), 0);
        assert_eq!(payout_result.settled_count(), 0);

        let completed = GatewayOutcome::Completed { reference: Some("RRN-1".into()) };
        gateway.settle(&format!("gw-refund-{}", first_refund.id), completed);
        let failed = GatewayOutcome::Failed { reason: "card expired".into() };
        gateway.settle(&format!("gw-refund-{}", second_refund.id), failed);
        let (refund_result, _) = run_reconciliation_sweep(&refunds, &payouts).await.unwrap();
        assert_eq!(refund_result.completed, vec![first_refund.id]);
        assert_eq!(refund_result.failed, vec![second_refund.id]);
        let refund = refunds.fetch_refund(first_refund.id).await.unwrap().unwrap();
        assert_eq!(refund.status, RefundStatus::Completed);
        let refund = refunds.fetch_refund(second_refund.id).await.unwrap().unwrap();
        assert_eq!(refund.status, RefundStatus::Failed);
        assert_eq!(refund.failure_reason.as_deref(), Some("card expired"));

        // Settled refunds are not asked about again
        let (refund_result, _) = run_reconciliation_sweep(&refunds, &payouts).await.unwrap();
        assert_eq!(refund_result.settled_count() + refund_result.in_progress.len(), 0);
    }
}

use chrono::{Duration, Utc};
use settlement_engine::{
    db_types::{
        Actor,
        ActorRole,
        GatewayOutcome,
        NewOrderItem,
        NewRefund,
        NewReturnRequest,
        OrderItem,
        OrderItemStatus,
        OrderReturn,
        QcResult,
        RefundSource,
        RefundStatus,
        ReturnStatus,
        SellerId,
        TransactionType,
    },
    InsertRefundResult,
    PayoutGenerationResult,
    SettlementError,
};

use crate::support::{period, rupees, Harness};

mod support;

/// Delivers an item and takes its return up to `picked_up`.
async fn picked_up_return(h: &Harness, rupees_amount: i64) -> (OrderItem, OrderReturn) {
    let item = h.delivered_item("ord-1", "s1", rupees_amount, Utc::now()).await;
    let buyer = Actor::buyer("b1");
    let request = NewReturnRequest::new(item.id, OrderItemStatus::Delivered, buyer, "does not fit");
    let requested = h.orders.request_return(request).await.unwrap();
    let return_id = requested.order_return.id;
    let seller = Actor::seller("s1");
    h.returns.schedule_pickup(return_id, ReturnStatus::Initiated, &seller, Some("slot 10-12".into())).await.unwrap();
    let picked = h.returns.confirm_pickup(return_id, &Actor::system(), Some("Pune hub".into())).await.unwrap();
    assert_eq!(picked.order_return.status, ReturnStatus::PickedUp);
    (item, picked.order_return)
}

#[tokio::test]
async fn passed_quality_check_refunds_once() {
    let h = Harness::new().await;
    let (item, order_return) = picked_up_return(&h, 500).await;
    let qc = Actor::new("qc-7", ActorRole::Admin);

    let outcome = h.returns.record_quality_check(order_return.id, QcResult::Passed, None, &qc).await.unwrap();
    assert_eq!(outcome.change.order_return.status, ReturnStatus::Approved);
    let refund = outcome.refund.expect("a passed check issues a refund").into_refund();
    assert_eq!(refund.amount, rupees(500));
    assert_eq!(refund.return_id, Some(order_return.id));
    assert_eq!(refund.idempotency_key, RefundSource::Return(order_return.id).idempotency_key(item.id));
    assert_eq!(refund.status, RefundStatus::Processing);

    // The same refund asked for again, e.g. by a retried request
    let again = NewRefund::new(item.id, RefundSource::Return(order_return.id), rupees(500), "original_payment");
    let result = h.refunds.process_refund(again).await.unwrap();
    assert!(matches!(&result, InsertRefundResult::AlreadyExists(r) if r.id == refund.id));

    assert_eq!(h.refunds.refunds_for_item(item.id).await.unwrap().len(), 1);
    assert_eq!(h.gateway.refunds().len(), 1);
    let history = h.ledger.history(&SellerId::from("s1")).await.unwrap();
    let debits: Vec<_> = history.iter().filter(|t| t.transaction_type == TransactionType::RefundDebit).collect();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].amount, rupees(-500));

    // The item was never paid out, so it simply drops out of settlement
    let records = h.payouts.settlement_records(&SellerId::from("s1")).await.unwrap();
    assert!(records[0].is_refunded);
    assert_eq!(records[0].refund_id, Some(refund.id));
    let balance = h.ledger.verify_seller(&SellerId::from("s1")).await.unwrap();
    assert_eq!(balance.balance(), rupees(0));
    assert_eq!(balance.total_refunded, rupees(500));
    h.tear_down().await;
}

#[tokio::test]
async fn completed_refund_closes_the_return() {
    let h = Harness::new().await;
    let (_, order_return) = picked_up_return(&h, 300).await;
    let outcome =
        h.returns.record_quality_check(order_return.id, QcResult::Passed, None, &Actor::admin("qc")).await.unwrap();
    let refund = outcome.refund.unwrap().into_refund();

    let completed = GatewayOutcome::Completed { reference: Some("bank-881".into()) };
    let refund = h.refunds.reconcile_refund(refund.id, completed.clone()).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Completed);
    assert_eq!(refund.gateway_reference.as_deref(), Some("bank-881"));
    let order_return = h.returns.fetch_return(order_return.id).await.unwrap().unwrap();
    assert_eq!(order_return.status, ReturnStatus::Refunded);

    // Repeating the verdict changes nothing
    let again = h.refunds.reconcile_refund(refund.id, completed).await.unwrap();
    assert_eq!(again, refund);
    // Contradicting it is refused
    let err = h.refunds.reconcile_refund(refund.id, GatewayOutcome::Failed { reason: "late".into() }).await;
    assert!(matches!(err, Err(SettlementError::InvalidTransition { .. })));

    let detail = h.returns.return_detail(order_return.id).await.unwrap();
    let trail: Vec<_> = detail.tracking.iter().map(|t| t.status).collect();
    assert_eq!(trail, vec![
        ReturnStatus::Initiated,
        ReturnStatus::PickupScheduled,
        ReturnStatus::PickedUp,
        ReturnStatus::Approved,
        ReturnStatus::Refunded
    ]);
    assert_eq!(detail.quality_check.map(|q| q.result), Some(QcResult::Passed));
    h.tear_down().await;
}

#[tokio::test]
async fn failed_quality_check_keeps_the_sale() {
    let h = Harness::new().await;
    let (item, order_return) = picked_up_return(&h, 400).await;
    let qc = Actor::admin("qc");
    let outcome = h
        .returns
        .record_quality_check(order_return.id, QcResult::Failed, Some("item used".into()), &qc)
        .await
        .unwrap();
    assert_eq!(outcome.change.order_return.status, ReturnStatus::Rejected);
    assert!(outcome.refund.is_none());
    assert!(h.refunds.refunds_for_item(item.id).await.unwrap().is_empty());
    assert!(h.gateway.refunds().is_empty());

    // A second inspection is refused
    let err = h.returns.record_quality_check(order_return.id, QcResult::Passed, None, &qc).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition { .. }));

    // The buyer keeps the item, so the seller gets paid for it
    let as_of = Utc::now() + Duration::days(8);
    let result = h.payouts.generate(&SellerId::from("s1"), period(), as_of).await.unwrap();
    let payout = result.payout().expect("the item is eligible again").clone();
    assert_eq!(payout.gross_sales, rupees(400));
    assert_eq!(payout.item_count, 1);
    h.tear_down().await;
}

#[tokio::test]
async fn open_returns_hold_back_settlement() {
    let h = Harness::new().await;
    let (_, _) = picked_up_return(&h, 250).await;
    let as_of = Utc::now() + Duration::days(8);
    let result = h.payouts.generate(&SellerId::from("s1"), period(), as_of).await.unwrap();
    assert_eq!(result, PayoutGenerationResult::NothingToSettle);
    h.tear_down().await;
}

#[tokio::test]
async fn quality_check_needs_a_picked_up_return() {
    let h = Harness::new().await;
    let item = h.delivered_item("ord-1", "s1", 100, Utc::now()).await;
    let request = NewReturnRequest::new(item.id, OrderItemStatus::Delivered, Actor::buyer("b1"), "broken");
    let requested = h.orders.request_return(request).await.unwrap();
    let err = h
        .returns
        .record_quality_check(requested.order_return.id, QcResult::Passed, None, &Actor::admin("qc"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition { .. }));
    let err = h
        .returns
        .transition(
            requested.order_return.id,
            ReturnStatus::Initiated,
            ReturnStatus::Approved,
            &Actor::admin("qc"),
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition { .. }));
    h.tear_down().await;
}

#[tokio::test]
async fn refunds_survive_a_gateway_outage() {
    let h = Harness::new().await;
    h.gateway.set_offline(true);
    let buyer = Actor::buyer("b1");
    let new_item = NewOrderItem::new("ord-2", SellerId::from("s1"), "listing-2", 1, rupees(150));
    let item = h.orders.place_order_item(new_item, &buyer).await.unwrap();
    let result = h.orders.cancel(item.id, OrderItemStatus::Pending, &buyer, None).await.unwrap();
    let refund = result.refund.into_refund();
    assert_eq!(refund.status, RefundStatus::Pending);
    // The debit is on the books regardless
    assert_eq!(h.balance("s1").await.total_refunded, rupees(150));

    let sweep = h.refunds.retry_pending_refunds().await.unwrap();
    assert!(sweep.dispatched.is_empty());
    assert_eq!(sweep.failed.len(), 1);

    h.gateway.set_offline(false);
    let sweep = h.refunds.retry_pending_refunds().await.unwrap();
    assert_eq!(sweep.dispatched.len(), 1);
    assert_eq!(sweep.dispatched[0].status, RefundStatus::Processing);
    let sweep = h.refunds.retry_pending_refunds().await.unwrap();
    assert!(sweep.dispatched.is_empty() && sweep.failed.is_empty());
    assert_eq!(h.gateway.refunds().len(), 1);

    let failed = GatewayOutcome::Failed { reason: "account closed".into() };
    let refund = h.refunds.reconcile_refund(refund.id, failed).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Failed);
    assert_eq!(refund.failure_reason.as_deref(), Some("account closed"));
    let cancellation = h.orders.cancellation(item.id).await.unwrap().unwrap();
    assert_eq!(cancellation.refund_status, RefundStatus::Failed);
    h.tear_down().await;
}

#[tokio::test]
async fn refused_refunds_fail_instead_of_retrying() {
    let h = Harness::new().await;
    h.gateway.set_refusing(Some("beneficiary account closed"));
    let buyer = Actor::buyer("b1");
    let new_item = NewOrderItem::new("ord-3", SellerId::from("s1"), "listing-3", 1, rupees(120));
    let item = h.orders.place_order_item(new_item, &buyer).await.unwrap();
    let result = h.orders.cancel(item.id, OrderItemStatus::Pending, &buyer, None).await.unwrap();
    let refund = result.refund.into_refund();
    assert_eq!(refund.status, RefundStatus::Failed);
    assert!(refund.failure_reason.unwrap().contains("beneficiary account closed"));
    let cancellation = h.orders.cancellation(item.id).await.unwrap().unwrap();
    assert_eq!(cancellation.refund_status, RefundStatus::Failed);

    // The sweep leaves it alone, even once the gateway would accept it
    h.gateway.set_refusing(None);
    let sweep = h.refunds.retry_pending_refunds().await.unwrap();
    assert!(sweep.dispatched.is_empty() && sweep.rejected.is_empty() && sweep.failed.is_empty());
    assert!(h.gateway.refunds().is_empty());
    // The seller's debit stands
    let balance = h.ledger.verify_seller(&SellerId::from("s1")).await.unwrap();
    assert_eq!(balance.total_refunded, rupees(120));
    h.tear_down().await;
}

#[tokio::test]
async fn refusal_during_the_sweep_is_reported() {
    let h = Harness::new().await;
    h.gateway.set_offline(true);
    let buyer = Actor::buyer("b1");
    let new_item = NewOrderItem::new("ord-4", SellerId::from("s1"), "listing-4", 2, rupees(40));
    let item = h.orders.place_order_item(new_item, &buyer).await.unwrap();
    let refund = h.orders.cancel(item.id, OrderItemStatus::Pending, &buyer, None).await.unwrap().refund.into_refund();
    assert_eq!(refund.status, RefundStatus::Pending);

    h.gateway.set_offline(false);
    h.gateway.set_refusing(Some("amount exceeds original payment"));
    let sweep = h.refunds.retry_pending_refunds().await.unwrap();
    assert!(sweep.dispatched.is_empty() && sweep.failed.is_empty());
    assert_eq!(sweep.rejected.len(), 1);
    assert_eq!(sweep.rejected[0].id, refund.id);
    assert_eq!(sweep.rejected[0].status, RefundStatus::Failed);
    let sweep = h.refunds.retry_pending_refunds().await.unwrap();
    assert!(sweep.rejected.is_empty());
    h.tear_down().await;
}

#[tokio::test]
async fn refund_outcomes_are_fetched_from_the_gateway() {
    let h = Harness::new().await;
    let (_, order_return) = picked_up_return(&h, 300).await;
    let outcome =
        h.returns.record_quality_check(order_return.id, QcResult::Passed, None, &Actor::admin("qc")).await.unwrap();
    let refund = outcome.refund.unwrap().into_refund();
    let reference = refund.gateway_reference.clone().unwrap();

    let polled = h.refunds.poll_processing_refunds().await.unwrap();
    assert_eq!(polled.in_progress, vec![refund.id]);
    assert_eq!(polled.settled_count(), 0);

    h.gateway.settle(&reference, GatewayOutcome::Completed { reference: Some("RRN-77".into()) });
    let polled = h.refunds.poll_processing_refunds().await.unwrap();
    assert_eq!(polled.completed, vec![refund.id]);
    let refund = h.refunds.fetch_refund(refund.id).await.unwrap().unwrap();
    assert_eq!(refund.status, RefundStatus::Completed);
    assert_eq!(refund.gateway_reference.as_deref(), Some("RRN-77"));
    let order_return = h.returns.fetch_return(order_return.id).await.unwrap().unwrap();
    assert_eq!(order_return.status, ReturnStatus::Refunded);

    let polled = h.refunds.poll_processing_refunds().await.unwrap();
    assert!(polled.completed.is_empty() && polled.in_progress.is_empty());
    h.tear_down().await;
}

#[tokio::test]
async fn refunds_must_cover_the_whole_item() {
    let h = Harness::new().await;
    let (item, order_return) = picked_up_return(&h, 500).await;
    // Not approved yet
    let early = NewRefund::new(item.id, RefundSource::Return(order_return.id), rupees(500), "original_payment");
    assert!(matches!(h.refunds.process_refund(early).await, Err(SettlementError::ValidationError(_))));
    let partial = NewRefund::new(item.id, RefundSource::Return(order_return.id), rupees(100), "original_payment");
    assert!(matches!(h.refunds.process_refund(partial).await, Err(SettlementError::ValidationError(_))));
    let negative = NewRefund::new(item.id, RefundSource::Return(order_return.id), rupees(-5), "original_payment");
    assert!(matches!(h.refunds.process_refund(negative).await, Err(SettlementError::ValidationError(_))));
    assert!(h.ledger.history(&SellerId::from("s1")).await.unwrap().iter().all(|t| t.amount.is_positive()));
    h.tear_down().await;
}

use chrono::Utc;
use settlement_engine::{
    db_types::{
        Actor,
        ActorRole,
        NewOrderItem,
        NewOrderPayment,
        NewReturnRequest,
        OrderItemStatus,
        Paise,
        RefundStatus,
        SellerId,
        TransactionType,
    },
    InsertRefundResult,
    SettlementError,
};

use crate::support::{rupees, Harness};

mod support;

#[tokio::test]
async fn skipping_fulfillment_steps_is_refused() {
    let h = Harness::new().await;
    let buyer = Actor::buyer("buyer-1");
    let new_item = NewOrderItem::new("ord-1", SellerId::from("s1"), "listing-1", 2, rupees(100));
    let item = h.orders.place_order_item(new_item, &buyer).await.unwrap();
    assert_eq!(item.status, OrderItemStatus::Pending);

    let err = h
        .orders
        .transition(item.id, OrderItemStatus::Pending, OrderItemStatus::Delivered, &Actor::system(), None)
        .await
        .expect_err("pending -> delivered must fail");
    assert!(matches!(err, SettlementError::InvalidTransition { .. }), "{err}");

    let item = h.orders.fetch_order_item(item.id).await.unwrap().unwrap();
    assert_eq!(item.status, OrderItemStatus::Pending);
    assert!(h.payouts.settlement_records(&SellerId::from("s1")).await.unwrap().is_empty());
    assert!(h.ledger.history(&SellerId::from("s1")).await.unwrap().is_empty());
    h.tear_down().await;
}

#[tokio::test]
async fn stale_expected_status_is_a_conflict() {
    let h = Harness::new().await;
    let seller = Actor::seller("s1");
    let new_item = NewOrderItem::new("ord-1", SellerId::from("s1"), "listing-1", 1, rupees(100));
    let item = h.orders.place_order_item(new_item, &Actor::buyer("b1")).await.unwrap();
    h.orders.transition(item.id, OrderItemStatus::Pending, OrderItemStatus::Confirmed, &seller, None).await.unwrap();

    // A second actor still believes the item is pending
    let err = h
        .orders
        .cancel(item.id, OrderItemStatus::Pending, &Actor::buyer("b1"), Some("changed my mind".into()))
        .await
        .expect_err("stale cancel must fail");
    assert!(err.is_retryable(), "expected a conflict, got {err}");

    let item = h.orders.fetch_order_item(item.id).await.unwrap().unwrap();
    assert_eq!(item.status, OrderItemStatus::Confirmed);
    assert!(h.orders.cancellation(item.id).await.unwrap().is_none());
    assert!(h.refunds.refunds_for_item(item.id).await.unwrap().is_empty());
    h.tear_down().await;
}

#[tokio::test]
async fn placement_is_validated() {
    let h = Harness::new().await;
    let buyer = Actor::buyer("b1");
    let zero_qty = NewOrderItem::new("ord-1", SellerId::from("s1"), "listing-1", 0, rupees(100));
    assert!(matches!(
        h.orders.place_order_item(zero_qty, &buyer).await,
        Err(SettlementError::ValidationError(_))
    ));
    let mut bad_total = NewOrderItem::new("ord-1", SellerId::from("s1"), "listing-1", 2, rupees(100));
    bad_total.subtotal = rupees(150);
    assert!(matches!(
        h.orders.place_order_item(bad_total, &buyer).await,
        Err(SettlementError::ValidationError(_))
    ));
    let negative_fee = NewOrderPayment::new("ord-1", rupees(100), Paise::from(-1), Paise::ZERO);
    assert!(matches!(
        h.orders.record_order_payment(negative_fee).await,
        Err(SettlementError::ValidationError(_))
    ));
    h.tear_down().await;
}

#[tokio::test]
async fn oversized_quantities_are_refused() {
    let h = Harness::new().await;
    let buyer = Actor::buyer("b1");
    let quantity = i64::MAX / 2 + 1;
    let huge = NewOrderItem::new("ord-1", SellerId::from("s1"), "listing-1", quantity, Paise::from(3));
    assert_eq!(huge.subtotal, Paise::from(i64::MAX));
    assert!(matches!(h.orders.place_order_item(huge, &buyer).await, Err(SettlementError::ValidationError(_))));
    // A subtotal supplied by hand does not get past the check either
    let mut forged = NewOrderItem::new("ord-1", SellerId::from("s1"), "listing-1", quantity, Paise::from(3));
    forged.subtotal = Paise::from(3);
    assert!(matches!(h.orders.place_order_item(forged, &buyer).await, Err(SettlementError::ValidationError(_))));
    h.tear_down().await;
}

#[tokio::test]
async fn cancelling_a_pending_item_refunds_it_in_full() {
    let h = Harness::new().await;
    let buyer = Actor::buyer("b1");
    let new_item = NewOrderItem::new("ord-1", SellerId::from("s1"), "listing-1", 1, rupees(200));
    let item = h.orders.place_order_item(new_item, &buyer).await.unwrap();

    let result = h.orders.cancel(item.id, OrderItemStatus::Pending, &buyer, Some("ordered twice".into())).await.unwrap();
    assert_eq!(result.change.item.status, OrderItemStatus::Cancelled);
    assert_eq!(result.cancellation.cancelled_by_role, ActorRole::Buyer);
    let refund = match result.refund {
        InsertRefundResult::Inserted(r) => r,
        other => panic!("expected a new refund, got {other:?}"),
    };
    assert_eq!(refund.amount, rupees(200));
    // The mock gateway accepts it straight away
    assert_eq!(refund.status, RefundStatus::Processing);
    assert_eq!(refund.gateway_reference.as_deref(), Some(format!("gw-refund-{}", refund.id).as_str()));
    let cancellation = h.orders.cancellation(item.id).await.unwrap().unwrap();
    assert_eq!(cancellation.refund_status, RefundStatus::Processing);

    let balance = h.balance("s1").await;
    assert_eq!(balance.pending_balance, rupees(-200));
    assert_eq!(balance.available_balance, Paise::ZERO);
    assert_eq!(balance.total_refunded, rupees(200));
    assert_eq!(balance.total_earned, Paise::ZERO);
    assert!(balance.is_consistent());

    let history = h.ledger.history(&SellerId::from("s1")).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].transaction_type, TransactionType::RefundDebit);
    assert_eq!(history[0].amount, rupees(-200));
    assert!(history[0].carry_forward);
    h.ledger.verify_seller(&SellerId::from("s1")).await.unwrap();
    h.tear_down().await;
}

#[tokio::test]
async fn delivery_credits_pending_balance() {
    let h = Harness::new().await;
    let payment = NewOrderPayment::new("ord-1", rupees(1_000), rupees(20), Paise::from(360)).with_reference("pay-1");
    h.orders.record_order_payment(payment.clone()).await.unwrap();
    // Recording it again is harmless
    let again = h.orders.record_order_payment(payment).await.unwrap();
    assert_eq!(again.gateway_fee, rupees(20));

    let item = h.delivered_item("ord-1", "s1", 500, Utc::now()).await;
    assert_eq!(item.status, OrderItemStatus::Delivered);

    let records = h.payouts.settlement_records(&SellerId::from("s1")).await.unwrap();
    assert_eq!(records.len(), 1);
    // Half of the order, so half of the fee and tax
    assert_eq!(records[0].allocated_fee, rupees(10));
    assert_eq!(records[0].allocated_tax, Paise::from(180));
    assert!(!records[0].is_released);

    let balance = h.balance("s1").await;
    assert_eq!(balance.pending_balance, rupees(500));
    assert_eq!(balance.available_balance, Paise::ZERO);
    assert_eq!(balance.total_earned, rupees(500));

    let history = h.orders.history(item.id).await.unwrap();
    let statuses: Vec<_> = history.iter().map(|row| row.new_status).collect();
    assert_eq!(statuses, vec![
        OrderItemStatus::Pending,
        OrderItemStatus::Confirmed,
        OrderItemStatus::Packed,
        OrderItemStatus::Shipped,
        OrderItemStatus::Delivered
    ]);
    assert_eq!(history[0].old_status, None);
    h.tear_down().await;
}

#[tokio::test]
async fn delivered_items_cannot_be_cancelled() {
    let h = Harness::new().await;
    let item = h.delivered_item("ord-1", "s1", 500, Utc::now()).await;
    let err = h
        .orders
        .transition(item.id, OrderItemStatus::Delivered, OrderItemStatus::Cancelled, &Actor::buyer("b1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransition { .. }));
    h.tear_down().await;
}

#[tokio::test]
async fn return_requests_need_a_reason() {
    let h = Harness::new().await;
    let item = h.delivered_item("ord-1", "s1", 500, Utc::now()).await;
    let request = NewReturnRequest::new(item.id, OrderItemStatus::Delivered, Actor::buyer("b1"), "  ");
    assert!(matches!(h.orders.request_return(request).await, Err(SettlementError::ValidationError(_))));

    let request = NewReturnRequest::new(item.id, OrderItemStatus::Delivered, Actor::buyer("b1"), "wrong size");
    let requested = h.orders.request_return(request).await.unwrap();
    assert_eq!(requested.change.item.status, OrderItemStatus::ReturnRequested);
    assert_eq!(requested.order_return.reason, "wrong size");
    assert_eq!(h.returns.returns_for_item(item.id).await.unwrap().len(), 1);
    h.tear_down().await;
}

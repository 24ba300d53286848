use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
    Mutex,
};

use chrono::{Duration, Utc};
use futures_util::FutureExt;
use log::*;
use settlement_engine::{
    db_types::{Actor, NewOrderItem, OrderItemStatus, PayoutStatus, RefundStatus, SellerId},
    events::{
        EventHandler,
        EventProducers,
        Handler,
        OrderStatusChangedEvent,
        PayoutStatusChangedEvent,
        RefundUpdatedEvent,
    },
};

use crate::support::{admin, period, rupees, Harness};

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn on_order_status_changed() {
    let event = HookCalled::default();
    let event_copy = event.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_copy = Arc::clone(&seen);
    let hook: Handler<OrderStatusChangedEvent> = Arc::new(move |ev: OrderStatusChangedEvent| {
        info!("🪝️ {} -> {}", ev.old_status, ev.new_status());
        event_copy.called();
        seen_copy.lock().unwrap().push(ev.new_status());
        async {}.boxed()
    });
    let handler = EventHandler::new(10, hook);
    let producers = EventProducers { order_status_changed_producer: vec![handler.subscribe()], ..Default::default() };
    let listener = tokio::spawn(handler.start_handler());

    let h = Harness::with_producers(producers).await;
    let item = h.delivered_item("ord-1", "s1", 500, Utc::now()).await;
    // Refused transitions are not announced
    let _ = h
        .orders
        .transition(item.id, OrderItemStatus::Delivered, OrderItemStatus::Cancelled, &Actor::buyer("b1"), None)
        .await
        .unwrap_err();
    h.tear_down().await;
    listener.await.unwrap();

    // placement is not a status change; confirm, pack, ship and deliver are
    assert_eq!(event.count(), 4);
    let seen = seen.lock().unwrap().clone();
    assert!(seen.contains(&OrderItemStatus::Delivered));
    assert!(!seen.contains(&OrderItemStatus::Cancelled));
    info!("🪝️ test complete");
}

#[tokio::test]
async fn on_refund_and_payout_updates() {
    let refunds = HookCalled::default();
    let refunds_copy = refunds.clone();
    let refund_hook: Handler<RefundUpdatedEvent> = Arc::new(move |ev: RefundUpdatedEvent| {
        info!("🪝️ Refund #{} is {}", ev.refund.id, ev.refund.status);
        if ev.refund.status == RefundStatus::Processing {
            refunds_copy.called();
        }
        async {}.boxed()
    });
    let paid = HookCalled::default();
    let paid_copy = paid.clone();
    let payout_hook: Handler<PayoutStatusChangedEvent> = Arc::new(move |ev: PayoutStatusChangedEvent| {
        info!("🪝️ Payout #{} is {}", ev.payout.id, ev.payout.status);
        if ev.is_paid() {
            paid_copy.called();
        }
        async {}.boxed()
    });
    let refund_handler = EventHandler::new(10, refund_hook);
    let payout_handler = EventHandler::new(10, payout_hook);
    let producers = EventProducers {
        refund_updated_producer: vec![refund_handler.subscribe()],
        payout_status_changed_producer: vec![payout_handler.subscribe()],
        ..Default::default()
    };
    let refund_listener = tokio::spawn(refund_handler.start_handler());
    let payout_listener = tokio::spawn(payout_handler.start_handler());

    let h = Harness::with_producers(producers).await;
    let buyer = Actor::buyer("b1");
    let item = h.shipped_item("ord-1", "s1", 100).await;
    let new_item = NewOrderItem::new("ord-2", SellerId::from("s1"), "listing-2", 1, rupees(100));
    let to_cancel = h.orders.place_order_item(new_item, &buyer).await.unwrap();
    h.orders.cancel(to_cancel.id, OrderItemStatus::Pending, &buyer, None).await.unwrap();
    let now = Utc::now();
    h.orders.deliver_at(item.id, OrderItemStatus::Shipped, &Actor::system(), None, now).await.unwrap();
    h.delivered_item("ord-3", "s1", 400, now).await;
    let payout = h.payouts.generate(&SellerId::from("s1"), period(), now + Duration::days(8)).await.unwrap();
    let payout_id = payout.payout().unwrap().id;
    h.payouts.approve(payout_id, &admin(), None, None).await.unwrap();
    let payout = h.payouts.mark_paid(payout_id, &admin(), "bank_transfer", "TXN1").await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Paid);
    h.tear_down().await;
    refund_listener.await.unwrap();
    payout_listener.await.unwrap();

    assert_eq!(refunds.count(), 1);
    assert_eq!(paid.count(), 1);
    info!("🪝️ test complete");
}

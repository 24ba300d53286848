use std::str::FromStr;

use chrono::{Duration, Utc};
use cucumber::{given, then, when};
use settlement_engine::db_types::{
    Actor,
    NewOrderItem,
    NewReturnRequest,
    OrderItemStatus,
    PayoutPeriod,
    PayoutStatus,
    QcResult,
    ReturnStatus,
    SellerId,
    TransactionType,
};

use crate::{
    cucumber::{SettlementSystem, SettlementWorld},
    support::{admin, period, rupees},
};

#[given("a fresh settlement system")]
async fn fresh_system(world: &mut SettlementWorld) {
    world.system = Some(SettlementSystem::new().await);
}

#[when(expr = "seller '{word}' sells item '{word}' for {int} rupees")]
async fn sell_item(world: &mut SettlementWorld, seller: String, label: String, price: i64) {
    let order_id = format!("ord-{label}");
    let item = NewOrderItem::new(order_id.as_str(), SellerId::from(seller), "listing-1", 1, rupees(price));
    let item = world.system().orders.place_order_item(item, &Actor::buyer("buyer-1")).await.expect("Error placing item");
    world.items.insert(label, item);
}

#[when(expr = "item '{word}' is delivered")]
async fn deliver_item(world: &mut SettlementWorld, label: String) {
    let id = world.item(&label).id;
    let seller = Actor::seller(world.item(&label).seller_id.as_str());
    let orders = &world.system().orders;
    let steps = [
        (OrderItemStatus::Pending, OrderItemStatus::Confirmed),
        (OrderItemStatus::Confirmed, OrderItemStatus::Packed),
        (OrderItemStatus::Packed, OrderItemStatus::Shipped),
    ];
    for (from, to) in steps {
        orders.transition(id, from, to, &seller, None).await.expect("Error moving item");
    }
    let result = orders.deliver(id, OrderItemStatus::Shipped, &Actor::system(), None).await.expect("Error delivering");
    world.items.insert(label, result.change.item);
}

#[when(expr = "the buyer cancels item '{word}'")]
async fn cancel_item(world: &mut SettlementWorld, label: String) {
    let item = world.item(&label).clone();
    let buyer = Actor::buyer("buyer-1");
    let result = world.system().orders.cancel(item.id, item.status, &buyer, None).await.expect("Error cancelling");
    world.items.insert(label, result.change.item);
}

#[when(expr = "the buyer returns item '{word}' because {string}")]
async fn return_item(world: &mut SettlementWorld, label: String, reason: String) {
    let item = world.item(&label).clone();
    let request = NewReturnRequest::new(item.id, item.status, Actor::buyer("buyer-1"), reason);
    let result = world.system().orders.request_return(request).await.expect("Error requesting return");
    world.items.insert(label, result.change.item);
}

#[when(expr = "the return of item '{word}' is picked up and {word} quality check")]
async fn inspect_return(world: &mut SettlementWorld, label: String, verdict: String) {
    let item_id = world.item(&label).id;
    let sys = world.system();
    let order_return = sys.returns.returns_for_item(item_id).await.unwrap().pop().expect("No return for item");
    let seller = Actor::seller(world.item(&label).seller_id.as_str());
    sys.returns.schedule_pickup(order_return.id, ReturnStatus::Initiated, &seller, None).await.expect("Error scheduling");
    sys.returns.confirm_pickup(order_return.id, &Actor::system(), None).await.expect("Error picking up");
    let result = match verdict.as_str() {
        "passes" => QcResult::Passed,
        "fails" => QcResult::Failed,
        v => panic!("Unknown quality check verdict {v}"),
    };
    sys.returns.record_quality_check(order_return.id, result, None, &admin()).await.expect("Error recording QC");
}

#[when(expr = "the payout batch runs {int} days later")]
async fn run_batch(world: &mut SettlementWorld, days: i64) {
    let as_of = Utc::now() + Duration::days(days);
    let batch = world.system().payouts.generate_all(period(), as_of).await.expect("Error running batch");
    assert!(batch.failed.is_empty(), "Batch failures: {:?}", batch.failed);
}

#[when(expr = "the payout batch for month {int} of {int} runs {int} days later")]
async fn run_batch_for_period(world: &mut SettlementWorld, month: u32, year: i32, days: i64) {
    let as_of = Utc::now() + Duration::days(days);
    let period = PayoutPeriod::new(month, year);
    let batch = world.system().payouts.generate_all(period, as_of).await.expect("Error running batch");
    assert!(batch.failed.is_empty(), "Batch failures: {:?}", batch.failed);
}

#[when(expr = "an admin approves the payout for seller '{word}'")]
async fn approve_payout(world: &mut SettlementWorld, seller: String) {
    let payout = world.latest_payout(&seller).await;
    world.system().payouts.approve(payout.id, &admin(), None, None).await.expect("Error approving payout");
}

#[when(expr = "an admin marks the payout for seller '{word}' paid with reference {string}")]
async fn pay_payout(world: &mut SettlementWorld, seller: String, reference: String) {
    let payout = world.latest_payout(&seller).await;
    world
        .system()
        .payouts
        .mark_paid(payout.id, &admin(), "bank_transfer", &reference)
        .await
        .expect("Error paying payout");
}

#[when(expr = "item '{word}' is moved from {word} to {word}")]
async fn move_item(world: &mut SettlementWorld, label: String, from: String, to: String) {
    let from = OrderItemStatus::from_str(&from).expect("Unknown status");
    let to = OrderItemStatus::from_str(&to).expect("Unknown status");
    let id = world.item(&label).id;
    let result = world.system().orders.transition(id, from, to, &Actor::system(), None).await;
    world.last_error = result.err().map(|e| e.to_string());
}

#[then(expr = "the last action failed with {string}")]
async fn last_action_failed(world: &mut SettlementWorld, message: String) {
    let err = world.last_error.as_deref().expect("The last action succeeded");
    assert!(err.contains(&message), "Expected an error containing '{message}', got '{err}'");
}

#[then(expr = "item '{word}' has status {word}")]
async fn item_status(world: &mut SettlementWorld, label: String, status: String) {
    let expected = OrderItemStatus::from_str(&status).expect("Unknown status");
    let id = world.item(&label).id;
    let item = world.system().orders.fetch_order_item(id).await.unwrap().expect("Item does not exist");
    assert_eq!(item.status, expected);
}

#[then(expr = "item '{word}' has a cancellation")]
async fn has_cancellation(world: &mut SettlementWorld, label: String) {
    let id = world.item(&label).id;
    let cancellation = world.system().orders.cancellation(id).await.unwrap();
    assert!(cancellation.is_some(), "No cancellation recorded");
}

#[then(expr = "item '{word}' has a refund of {int} rupees")]
async fn has_refund(world: &mut SettlementWorld, label: String, amount: i64) {
    let id = world.item(&label).id;
    let refunds = world.system().refunds.refunds_for_item(id).await.unwrap();
    assert_eq!(refunds.len(), 1, "Expected exactly one refund");
    assert_eq!(refunds[0].amount, rupees(amount));
}

#[then(expr = "item '{word}' is settled")]
async fn item_settled(world: &mut SettlementWorld, label: String) {
    let item = world.item(&label).clone();
    let records = world.system().payouts.settlement_records(&item.seller_id).await.unwrap();
    let record = records.iter().find(|r| r.order_item_id == item.id).expect("Item has no settlement record");
    assert!(record.is_settled);
}

#[then(expr = "seller '{word}' has a pending balance of {int} rupees")]
async fn pending_balance(world: &mut SettlementWorld, seller: String, amount: i64) {
    assert_eq!(world.system().balance(&seller).await.pending_balance, rupees(amount));
}

#[then(expr = "seller '{word}' has an available balance of {int} rupees")]
async fn available_balance(world: &mut SettlementWorld, seller: String, amount: i64) {
    assert_eq!(world.system().balance(&seller).await.available_balance, rupees(amount));
}

#[then(expr = "seller '{word}' has been paid out {int} rupees")]
async fn paid_out(world: &mut SettlementWorld, seller: String, amount: i64) {
    assert_eq!(world.system().balance(&seller).await.total_paid_out, rupees(amount));
}

#[then(expr = "the latest payout for seller '{word}' is {word} with gross sales of {int} and net amount of {int} rupees")]
async fn latest_payout(world: &mut SettlementWorld, seller: String, status: String, gross: i64, net: i64) {
    let payout = world.latest_payout(&seller).await;
    assert_eq!(payout.status, PayoutStatus::from_str(&status).expect("Unknown payout status"));
    assert_eq!(payout.gross_sales, rupees(gross));
    assert_eq!(payout.net_amount, rupees(net));
}

#[then(expr = "the latest payout for seller '{word}' carries a previous balance of {int} rupees")]
async fn previous_balance(world: &mut SettlementWorld, seller: String, amount: i64) {
    let payout = world.latest_payout(&seller).await;
    assert_eq!(payout.previous_balance, rupees(amount));
}

#[then(expr = "the last ledger entry for seller '{word}' is a {word} of {int} rupees")]
async fn last_ledger_entry(world: &mut SettlementWorld, seller: String, kind: String, amount: i64) {
    let history = world.system().ledger.history(&SellerId::from(seller)).await.unwrap();
    let last = history.last().expect("The ledger is empty");
    assert_eq!(last.transaction_type, TransactionType::from(kind));
    assert_eq!(last.amount, rupees(amount));
}

#[then(expr = "the ledger for seller '{word}' is consistent")]
async fn ledger_consistent(world: &mut SettlementWorld, seller: String) {
    world.system().ledger.verify_seller(&SellerId::from(seller)).await.expect("Ledger is inconsistent");
}

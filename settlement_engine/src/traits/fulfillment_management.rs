use chrono::{DateTime, Utc};

use crate::{
    config::HoldPolicy,
    db_types::{
        Actor,
        NewOrderItem,
        NewOrderPayment,
        OrderCancellation,
        OrderItem,
        OrderItemStatus,
        OrderPayment,
        OrderStatusHistory,
    },
    traits::{
        data_objects::{CancellationResult, DeliveryResult, OrderItemChanged},
        SettlementError,
    },
};

/// Storage for the order fulfillment state machine.
///
/// The backend checks the stored status against `expected` inside its transaction; a mismatch is a
/// [`SettlementError::Conflict`]. Edge validation against the transition table happens before the backend is called.
#[allow(async_fn_in_trait)]
pub trait FulfillmentManagement {
    /// Inserts a new order item with status `pending` and writes the first history entry.
    async fn insert_order_item(&self, item: NewOrderItem, actor: &Actor) -> Result<OrderItem, SettlementError>;

    /// Stores the payment for an order. Returns `false` in the second parameter if a payment for the order already
    /// exists, in which case the stored record is returned unchanged.
    async fn insert_order_payment(&self, payment: NewOrderPayment) -> Result<(OrderPayment, bool), SettlementError>;

    async fn fetch_order_item(&self, id: i64) -> Result<Option<OrderItem>, SettlementError>;

    async fn fetch_order_items_for_order(&self, order_id: &str) -> Result<Vec<OrderItem>, SettlementError>;

    async fn fetch_order_payment(&self, order_id: &str) -> Result<Option<OrderPayment>, SettlementError>;

    async fn fetch_status_history(&self, order_item_id: i64) -> Result<Vec<OrderStatusHistory>, SettlementError>;

    async fn fetch_cancellation(&self, order_item_id: i64) -> Result<Option<OrderCancellation>, SettlementError>;

    /// A plain status change with no side effects besides the history entry.
    async fn update_order_item_status(
        &self,
        id: i64,
        expected: OrderItemStatus,
        target: OrderItemStatus,
        actor: &Actor,
        remarks: Option<String>,
    ) -> Result<OrderItemChanged, SettlementError>;

    /// Marks the item delivered and, in the same transaction, credits the sale to the seller's pending balance and
    /// creates the pending-settlement record with its fee and tax shares and hold deadline.
    async fn deliver_order_item(
        &self,
        id: i64,
        expected: OrderItemStatus,
        actor: &Actor,
        remarks: Option<String>,
        hold_policy: &HoldPolicy,
        delivered_at: DateTime<Utc>,
    ) -> Result<DeliveryResult, SettlementError>;

    /// Cancels the item and, in the same transaction, records the cancellation and refunds the full subtotal.
    async fn cancel_order_item(
        &self,
        id: i64,
        expected: OrderItemStatus,
        actor: &Actor,
        reason: Option<String>,
        refund_method: &str,
    ) -> Result<CancellationResult, SettlementError>;
}

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    config::SettlementConfig,
    db_types::{
        Actor,
        NewOrderItem,
        NewOrderPayment,
        NewReturnRequest,
        OrderCancellation,
        OrderItem,
        OrderItemStatus,
        OrderPayment,
        OrderStatusHistory,
    },
    events::{EventProducers, OrderStatusChangedEvent},
    settlement_api::refund_api::RefundApi,
    traits::{
        CancellationResult,
        DeliveryResult,
        InsertRefundResult,
        OrderItemChanged,
        PaymentGateway,
        ReturnRequested,
        SettlementDatabase,
        SettlementError,
    },
};

/// `OrderFlowApi` drives an order item through fulfillment:
///
/// ```text
/// pending -> confirmed -> packed -> shipped -> delivered
/// pending | confirmed -> cancelled
/// shipped | delivered -> return_requested
/// ```
///
/// Every transition names the status the caller believes the item is in. The edge is checked against the table
/// first (`InvalidTransition`), then the database refuses the write if the stored status has moved on (`Conflict`).
/// Neither failure writes anything.
pub struct OrderFlowApi<B, G> {
    db: B,
    refunds: RefundApi<B, G>,
    producers: EventProducers,
    config: SettlementConfig,
}

impl<B, G> Debug for OrderFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({})", self.config.hold_policy)
    }
}

impl<B, G> OrderFlowApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    pub fn new(db: B, gateway: G, producers: EventProducers, config: SettlementConfig) -> Self {
        let refunds = RefundApi::new(db.clone(), gateway, producers.clone());
        Self { db, refunds, producers, config }
    }

    /// Adds a new item in `pending`.
    pub async fn place_order_item(&self, item: NewOrderItem, actor: &Actor) -> Result<OrderItem, SettlementError> {
        if item.quantity <= 0 {
            return Err(SettlementError::ValidationError(format!("Quantity must be positive, not {}", item.quantity)));
        }
        if !item.price_per_unit.is_positive() {
            return Err(SettlementError::ValidationError(format!(
                "Price per unit must be positive, not {}",
                item.price_per_unit
            )));
        }
        let Some(expected_subtotal) = item.price_per_unit.checked_mul(item.quantity) else {
            return Err(SettlementError::ValidationError(format!(
                "{} × {} is too large to be an order item subtotal",
                item.quantity, item.price_per_unit
            )));
        };
        if item.subtotal != expected_subtotal {
            return Err(SettlementError::ValidationError(format!(
                "Subtotal {} does not match {} × {}",
                item.subtotal, item.quantity, item.price_per_unit
            )));
        }
        let item = self.db.insert_order_item(item, actor).await?;
        debug!("📦️ Order item #{} placed on order {} for seller {}", item.id, item.order_id, item.seller_id);
        Ok(item)
    }

    /// Records the buyer's payment for an order. Recording the same order's payment twice returns the first record.
    pub async fn record_order_payment(&self, payment: NewOrderPayment) -> Result<OrderPayment, SettlementError> {
        if !payment.amount.is_positive() {
            return Err(SettlementError::ValidationError(format!(
                "Payment amount must be positive, not {}",
                payment.amount
            )));
        }
        if payment.gateway_fee.is_negative() || payment.gateway_tax.is_negative() {
            return Err(SettlementError::ValidationError("Gateway fee and tax cannot be negative".into()));
        }
        let (payment, inserted) = self.db.insert_order_payment(payment).await?;
        if !inserted {
            debug!("📦️ Payment for order {} was already recorded", payment.order_id);
        }
        Ok(payment)
    }

    /// Moves the item from `expected` to `target`, with the side effects the target calls for:
    /// * `delivered` credits the sale to the seller and starts the settlement hold,
    /// * `cancelled` records the cancellation and refunds the full subtotal,
    /// * `return_requested` opens a return, using `remarks` as the buyer's reason.
    pub async fn transition(
        &self,
        id: i64,
        expected: OrderItemStatus,
        target: OrderItemStatus,
        actor: &Actor,
        remarks: Option<String>,
    ) -> Result<OrderItemChanged, SettlementError> {
        check_edge(id, expected, target)?;
        match target {
            OrderItemStatus::Delivered => Ok(self.deliver(id, expected, actor, remarks).await?.change),
            OrderItemStatus::Cancelled => Ok(self.cancel(id, expected, actor, remarks).await?.change),
            OrderItemStatus::ReturnRequested => {
                let reason = remarks.unwrap_or_default();
                let request = NewReturnRequest::new(id, expected, actor.clone(), reason);
                Ok(self.request_return(request).await?.change)
            },
            _ => {
                let change = self.db.update_order_item_status(id, expected, target, actor, remarks.clone()).await?;
                self.notify(&change, actor, remarks).await;
                Ok(change)
            },
        }
    }

    pub async fn deliver(
        &self,
        id: i64,
        expected: OrderItemStatus,
        actor: &Actor,
        remarks: Option<String>,
    ) -> Result<DeliveryResult, SettlementError> {
        self.deliver_at(id, expected, actor, remarks, Utc::now()).await
    }

    /// As [`Self::deliver`], with the delivery time given by the caller (e.g. the courier's scan time).
    pub async fn deliver_at(
        &self,
        id: i64,
        expected: OrderItemStatus,
        actor: &Actor,
        remarks: Option<String>,
        delivered_at: DateTime<Utc>,
    ) -> Result<DeliveryResult, SettlementError> {
        check_edge(id, expected, OrderItemStatus::Delivered)?;
        let policy = &self.config.hold_policy;
        let result = self.db.deliver_order_item(id, expected, actor, remarks.clone(), policy, delivered_at).await?;
        info!(
            "📦️ Order item #{id} delivered. Seller {} is owed {} after {}",
            result.change.item.seller_id, result.change.item.subtotal, result.settlement.settlement_hold_until
        );
        self.notify(&result.change, actor, remarks).await;
        Ok(result)
    }

    /// Cancels the item and refunds it in full.
    pub async fn cancel(
        &self,
        id: i64,
        expected: OrderItemStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<CancellationResult, SettlementError> {
        check_edge(id, expected, OrderItemStatus::Cancelled)?;
        let method = &self.config.default_refund_method;
        let mut result = self.db.cancel_order_item(id, expected, actor, reason.clone(), method).await?;
        info!("📦️ Order item #{id} cancelled by {actor}. {} will be refunded", result.change.item.subtotal);
        self.notify(&result.change, actor, reason).await;
        if let InsertRefundResult::Inserted(refund) = result.refund {
            result.refund = InsertRefundResult::Inserted(self.refunds.refund_created(refund).await);
        }
        Ok(result)
    }

    /// Moves the item to `return_requested` and opens a return for it.
    pub async fn request_return(&self, request: NewReturnRequest) -> Result<ReturnRequested, SettlementError> {
        let id = request.order_item_id;
        check_edge(id, request.expected_status, OrderItemStatus::ReturnRequested)?;
        if request.reason.trim().is_empty() {
            return Err(SettlementError::ValidationError("A reason is required to request a return".into()));
        }
        let buyer = request.buyer.clone();
        let reason = Some(request.reason.clone());
        let result = self.db.insert_return(request).await?;
        info!("↩️ Return #{} requested for order item #{id} by {buyer}", result.order_return.id);
        self.notify(&result.change, &buyer, reason).await;
        Ok(result)
    }

    pub async fn fetch_order_item(&self, id: i64) -> Result<Option<OrderItem>, SettlementError> {
        self.db.fetch_order_item(id).await
    }

    pub async fn order_items(&self, order_id: &str) -> Result<Vec<OrderItem>, SettlementError> {
        self.db.fetch_order_items_for_order(order_id).await
    }

    pub async fn order_payment(&self, order_id: &str) -> Result<Option<OrderPayment>, SettlementError> {
        self.db.fetch_order_payment(order_id).await
    }

    pub async fn history(&self, id: i64) -> Result<Vec<OrderStatusHistory>, SettlementError> {
        self.db.fetch_status_history(id).await
    }

    pub async fn cancellation(&self, id: i64) -> Result<Option<OrderCancellation>, SettlementError> {
        self.db.fetch_cancellation(id).await
    }

    async fn notify(&self, change: &OrderItemChanged, actor: &Actor, remarks: Option<String>) {
        let event = OrderStatusChangedEvent::new(change.item.clone(), change.old_status, actor.clone(), remarks);
        self.producers.publish_order_status_changed(event).await;
    }
}

fn check_edge(id: i64, from: OrderItemStatus, to: OrderItemStatus) -> Result<(), SettlementError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        debug!("📦️ Refusing to move order item #{id} from {from} to {to}");
        Err(SettlementError::invalid_transition(format!("Order item #{id}"), from, to))
    }
}

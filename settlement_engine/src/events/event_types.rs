use serde::{Deserialize, Serialize};

use crate::db_types::{
    Actor,
    OrderItem,
    OrderItemStatus,
    OrderRefund,
    OrderReturn,
    PayoutStatus,
    QualityCheck,
    ReturnStatus,
    SellerPayout,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub item: OrderItem,
    pub old_status: OrderItemStatus,
    pub actor: Actor,
    pub remarks: Option<String>,
}

impl OrderStatusChangedEvent {
    pub fn new(item: OrderItem, old_status: OrderItemStatus, actor: Actor, remarks: Option<String>) -> Self {
        Self { item, old_status, actor, remarks }
    }

    pub fn new_status(&self) -> OrderItemStatus {
        self.item.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnQualityCheckEvent {
    pub order_return: OrderReturn,
    pub old_status: ReturnStatus,
    pub quality_check: QualityCheck,
    /// The refund issued because the check passed.
    pub refund: Option<OrderRefund>,
}

impl ReturnQualityCheckEvent {
    pub fn new(
        order_return: OrderReturn,
        old_status: ReturnStatus,
        quality_check: QualityCheck,
        refund: Option<OrderRefund>,
    ) -> Self {
        Self { order_return, old_status, quality_check, refund }
    }
}

/// Emitted when a refund is created, handed to the gateway, or reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundUpdatedEvent {
    pub refund: OrderRefund,
}

impl RefundUpdatedEvent {
    pub fn new(refund: OrderRefund) -> Self {
        Self { refund }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutStatusChangedEvent {
    pub payout: SellerPayout,
    /// `None` for a freshly generated payout.
    pub old_status: Option<PayoutStatus>,
}

impl PayoutStatusChangedEvent {
    pub fn new(payout: SellerPayout, old_status: Option<PayoutStatus>) -> Self {
        Self { payout, old_status }
    }

    pub fn is_paid(&self) -> bool {
        self.payout.status == PayoutStatus::Paid
    }
}

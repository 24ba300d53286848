use serde::{Deserialize, Serialize};

use crate::db_types::{
    OrderCancellation,
    OrderItem,
    OrderItemStatus,
    OrderRefund,
    OrderReturn,
    PayoutApprovalLog,
    PayoutDeduction,
    PayoutItem,
    QualityCheck,
    ReturnStatus,
    ReturnTracking,
    SellerId,
    SellerPayout,
};

/// Result of an idempotent refund insert. A repeated request for the same (order item, source) pair returns the
/// refund that already exists and writes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertRefundResult {
    Inserted(OrderRefund),
    AlreadyExists(OrderRefund),
}

impl InsertRefundResult {
    pub fn refund(&self) -> &OrderRefund {
        match self {
            Self::Inserted(r) | Self::AlreadyExists(r) => r,
        }
    }

    pub fn into_refund(self) -> OrderRefund {
        match self {
            Self::Inserted(r) | Self::AlreadyExists(r) => r,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Result of a payout generation run for one seller and period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutGenerationResult {
    Inserted(SellerPayout),
    /// A non-rejected payout for this seller and period already exists.
    AlreadyExists(SellerPayout),
    /// There are no eligible items. No payout was created.
    NothingToSettle,
}

impl PayoutGenerationResult {
    pub fn payout(&self) -> Option<&SellerPayout> {
        match self {
            Self::Inserted(p) | Self::AlreadyExists(p) => Some(p),
            Self::NothingToSettle => None,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// An order item status change as committed to the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemChanged {
    pub old_status: OrderItemStatus,
    pub item: OrderItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub change: OrderItemChanged,
    /// The pending-settlement record for the delivered item.
    pub settlement: PayoutItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationResult {
    pub change: OrderItemChanged,
    pub cancellation: OrderCancellation,
    pub refund: InsertRefundResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequested {
    pub change: OrderItemChanged,
    pub order_return: OrderReturn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnChanged {
    pub old_status: ReturnStatus,
    pub order_return: OrderReturn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCheckOutcome {
    pub change: ReturnChanged,
    pub quality_check: QualityCheck,
    /// Present when the check passed.
    pub refund: Option<InsertRefundResult>,
}

/// A return with its full paper trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnDetail {
    pub order_return: OrderReturn,
    pub tracking: Vec<ReturnTracking>,
    pub quality_check: Option<QualityCheck>,
}

/// A payout with everything that contributed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDetail {
    pub payout: SellerPayout,
    pub items: Vec<PayoutItem>,
    pub deductions: Vec<PayoutDeduction>,
    pub logs: Vec<PayoutApprovalLog>,
}

/// Outcome of a batch run over every seller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub generated: Vec<SellerPayout>,
    pub already_existed: Vec<SellerPayout>,
    pub nothing_to_settle: Vec<SellerId>,
    pub failed: Vec<(SellerId, String)>,
}

impl BatchResult {
    pub fn total_count(&self) -> usize {
        self.generated.len() + self.already_existed.len() + self.nothing_to_settle.len() + self.failed.len()
    }
}

/// Outcome of asking the gateway about refunds or disbursements it accepted earlier. Each list holds refund or payout
/// ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub completed: Vec<i64>,
    pub failed: Vec<i64>,
    pub in_progress: Vec<i64>,
    pub errors: Vec<(i64, String)>,
}

impl ReconciliationResult {
    pub fn settled_count(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}

/// Outcome of a refund dispatch sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchResult {
    pub dispatched: Vec<OrderRefund>,
    /// Refunds the gateway refused outright. They are now `failed` and will not be sent again.
    pub rejected: Vec<OrderRefund>,
    /// Refunds that could not be sent this time, with the reason. They stay `pending`.
    pub failed: Vec<(i64, String)>,
}

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
pub use settlement_common::Paise;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

/// Implements `Display`, `FromStr` and a lenient `From<String>` for a snake_case status enum.
macro_rules! status_strings {
    ($t:ty, $fallback:expr, { $($variant:path => $s:literal),+ $(,)? }) => {
        impl Display for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $($variant => write!(f, $s),)+
                }
            }
        }

        impl FromStr for $t {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($variant),)+
                    s => Err(ConversionError(format!("{s} is not a valid {}", stringify!($t)))),
                }
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_else(|_| {
                    error!("Invalid {}: {value}. This conversion cannot fail. Defaulting to {}", stringify!($t), $fallback);
                    $fallback
                })
            }
        }
    };
}

//--------------------------------------       SellerId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct SellerId(pub String);

impl Display for SellerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for SellerId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl SellerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------         Actor         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum ActorRole {
    Buyer,
    Seller,
    Admin,
    System,
}

status_strings!(ActorRole, ActorRole::System, {
    ActorRole::Buyer => "buyer",
    ActorRole::Seller => "seller",
    ActorRole::Admin => "admin",
    ActorRole::System => "system",
});

/// Whoever is driving a state change. Authentication happens elsewhere; the engine only records who it was told.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new<S: Into<String>>(id: S, role: ActorRole) -> Self {
        Self { id: id.into(), role }
    }

    pub fn buyer<S: Into<String>>(id: S) -> Self {
        Self::new(id, ActorRole::Buyer)
    }

    pub fn seller<S: Into<String>>(id: S) -> Self {
        Self::new(id, ActorRole::Seller)
    }

    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    pub fn system() -> Self {
        Self::new("system", ActorRole::System)
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

//--------------------------------------    OrderItemStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum OrderItemStatus {
    /// The item has been ordered, but the seller has not accepted it yet.
    Pending,
    Confirmed,
    Packed,
    Shipped,
    /// Terminal success. The sale is credited to the seller's pending balance.
    Delivered,
    /// Terminal. The buyer is refunded in full.
    Cancelled,
    /// The item is handed over to the return workflow.
    ReturnRequested,
}

status_strings!(OrderItemStatus, OrderItemStatus::Pending, {
    OrderItemStatus::Pending => "pending",
    OrderItemStatus::Confirmed => "confirmed",
    OrderItemStatus::Packed => "packed",
    OrderItemStatus::Shipped => "shipped",
    OrderItemStatus::Delivered => "delivered",
    OrderItemStatus::Cancelled => "cancelled",
    OrderItemStatus::ReturnRequested => "return_requested",
});

impl OrderItemStatus {
    /// The order fulfillment transition table.
    ///
    /// | From \ To        | confirmed | packed | shipped | delivered | cancelled | return_requested |
    /// |------------------|-----------|--------|---------|-----------|-----------|------------------|
    /// | pending          | ✔         |        |         |           | ✔         |                  |
    /// | confirmed        |           | ✔      |         |           | ✔         |                  |
    /// | packed           |           |        | ✔       |           |           |                  |
    /// | shipped          |           |        |         | ✔         |           | ✔                |
    /// | delivered        |           |        |         |           |           | ✔                |
    pub fn can_transition_to(&self, target: OrderItemStatus) -> bool {
        use OrderItemStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed) |
                (Confirmed, Packed) |
                (Packed, Shipped) |
                (Shipped, Delivered) |
                (Pending | Confirmed, Cancelled) |
                (Shipped | Delivered, ReturnRequested)
        )
    }
}

//--------------------------------------     ReturnStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum ReturnStatus {
    Initiated,
    SellerReview,
    PickupScheduled,
    PickedUp,
    QualityCheck,
    /// QC passed. A refund has been recorded and is waiting for the gateway.
    Approved,
    /// QC failed. Terminal; the buyer keeps the item and no refund is issued.
    Rejected,
    Refunded,
    Completed,
}

status_strings!(ReturnStatus, ReturnStatus::Initiated, {
    ReturnStatus::Initiated => "initiated",
    ReturnStatus::SellerReview => "seller_review",
    ReturnStatus::PickupScheduled => "pickup_scheduled",
    ReturnStatus::PickedUp => "picked_up",
    ReturnStatus::QualityCheck => "quality_check",
    ReturnStatus::Approved => "approved",
    ReturnStatus::Rejected => "rejected",
    ReturnStatus::Refunded => "refunded",
    ReturnStatus::Completed => "completed",
});

impl ReturnStatus {
    /// Edges that can be driven directly by an operator. `approved` and `rejected` are only reachable through a quality
    /// check result, and `refunded` only through refund reconciliation.
    pub fn can_transition_to(&self, target: ReturnStatus) -> bool {
        use ReturnStatus::*;
        matches!(
            (self, target),
            (Initiated, SellerReview) |
                (Initiated | SellerReview, PickupScheduled) |
                (PickupScheduled, PickedUp) |
                (PickedUp, QualityCheck) |
                (Refunded, Completed)
        )
    }

    /// Only a return that has physically been picked up can be inspected.
    pub fn accepts_quality_check(&self) -> bool {
        matches!(self, ReturnStatus::PickedUp | ReturnStatus::QualityCheck)
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, ReturnStatus::Rejected | ReturnStatus::Refunded | ReturnStatus::Completed)
    }
}

//--------------------------------------        QcResult       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum QcResult {
    Passed,
    Failed,
}

status_strings!(QcResult, QcResult::Failed, {
    QcResult::Passed => "passed",
    QcResult::Failed => "failed",
});

//--------------------------------------      RefundStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Recorded, not yet handed to the payment gateway.
    Pending,
    /// Handed to the payment gateway, waiting for confirmation.
    Processing,
    Completed,
    Failed,
}

status_strings!(RefundStatus, RefundStatus::Pending, {
    RefundStatus::Pending => "pending",
    RefundStatus::Processing => "processing",
    RefundStatus::Completed => "completed",
    RefundStatus::Failed => "failed",
});

impl RefundStatus {
    pub fn can_transition_to(&self, target: RefundStatus) -> bool {
        use RefundStatus::*;
        matches!((self, target), (Pending, Processing) | (Pending | Processing, Completed | Failed))
    }
}

//--------------------------------------     TransactionType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum TransactionType {
    SaleCredit,
    RefundDebit,
    PayoutDebit,
    BalanceAdjustment,
}

status_strings!(TransactionType, TransactionType::BalanceAdjustment, {
    TransactionType::SaleCredit => "sale_credit",
    TransactionType::RefundDebit => "refund_debit",
    TransactionType::PayoutDebit => "payout_debit",
    TransactionType::BalanceAdjustment => "balance_adjustment",
});

//--------------------------------------      PayoutStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Paid,
    Rejected,
}

status_strings!(PayoutStatus, PayoutStatus::Pending, {
    PayoutStatus::Pending => "pending",
    PayoutStatus::Approved => "approved",
    PayoutStatus::Paid => "paid",
    PayoutStatus::Rejected => "rejected",
});

impl PayoutStatus {
    pub fn can_transition_to(&self, target: PayoutStatus) -> bool {
        use PayoutStatus::*;
        matches!((self, target), (Pending, Approved) | (Approved, Paid) | (Pending, Rejected))
    }
}

//--------------------------------------   DisbursementStatus  ---------------------------------------------------------
/// Whether the gateway has confirmed that the money for a paid payout actually moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
pub enum DisbursementStatus {
    Unconfirmed,
    Confirmed,
    Failed,
}

status_strings!(DisbursementStatus, DisbursementStatus::Unconfirmed, {
    DisbursementStatus::Unconfirmed => "unconfirmed",
    DisbursementStatus::Confirmed => "confirmed",
    DisbursementStatus::Failed => "failed",
});

//--------------------------------------       OrderItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: String,
    pub seller_id: SellerId,
    pub listing_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
    pub price_per_unit: Paise,
    pub subtotal: Paise,
    pub status: OrderItemStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub order_id: String,
    pub seller_id: SellerId,
    pub listing_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
    pub price_per_unit: Paise,
    pub subtotal: Paise,
}

impl NewOrderItem {
    /// Creates a new order item with `subtotal = quantity × price_per_unit`. A product too large for an `i64` saturates,
    /// and is refused when the item is placed.
    pub fn new<S: Into<String>>(
        order_id: S,
        seller_id: SellerId,
        listing_id: S,
        quantity: i64,
        price_per_unit: Paise,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            seller_id,
            listing_id: listing_id.into(),
            variant_id: None,
            quantity,
            price_per_unit,
            subtotal: price_per_unit.saturating_mul(quantity),
        }
    }

    pub fn with_variant<S: Into<String>>(mut self, variant_id: S) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }
}

//--------------------------------------      OrderPayment     ---------------------------------------------------------
/// The buyer's payment for a whole order, with the gateway's fee and tax on it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderPayment {
    pub id: i64,
    pub order_id: String,
    pub amount: Paise,
    pub gateway_fee: Paise,
    pub gateway_tax: Paise,
    pub gateway_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderPayment {
    pub order_id: String,
    pub amount: Paise,
    pub gateway_fee: Paise,
    pub gateway_tax: Paise,
    pub gateway_reference: Option<String>,
}

impl NewOrderPayment {
    pub fn new<S: Into<String>>(order_id: S, amount: Paise, gateway_fee: Paise, gateway_tax: Paise) -> Self {
        Self { order_id: order_id.into(), amount, gateway_fee, gateway_tax, gateway_reference: None }
    }

    pub fn with_reference<S: Into<String>>(mut self, reference: S) -> Self {
        self.gateway_reference = Some(reference.into());
        self
    }
}

//--------------------------------------   OrderStatusHistory  ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_item_id: i64,
    pub old_status: Option<OrderItemStatus>,
    pub new_status: OrderItemStatus,
    pub changed_by: String,
    pub changed_by_role: ActorRole,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   OrderCancellation   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderCancellation {
    pub id: i64,
    pub order_item_id: i64,
    pub cancelled_by: String,
    pub cancelled_by_role: ActorRole,
    pub reason: Option<String>,
    /// Mirrors the status of the refund issued for this cancellation.
    pub refund_status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      OrderReturn      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderReturn {
    pub id: i64,
    pub order_item_id: i64,
    pub buyer_id: String,
    pub reason: String,
    pub return_type: String,
    pub status: ReturnStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReturnRequest {
    pub order_item_id: i64,
    /// The status the buyer saw the item in when asking for the return.
    pub expected_status: OrderItemStatus,
    pub buyer: Actor,
    pub reason: String,
    pub return_type: String,
}

impl NewReturnRequest {
    pub fn new<S: Into<String>>(order_item_id: i64, expected_status: OrderItemStatus, buyer: Actor, reason: S) -> Self {
        Self { order_item_id, expected_status, buyer, reason: reason.into(), return_type: "refund".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReturnTracking {
    pub id: i64,
    pub return_id: i64,
    pub status: ReturnStatus,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct QualityCheck {
    pub id: i64,
    pub return_id: i64,
    pub result: QcResult,
    pub remarks: Option<String>,
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      OrderRefund      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderRefund {
    pub id: i64,
    pub order_item_id: i64,
    pub seller_id: SellerId,
    pub return_id: Option<i64>,
    pub cancellation_id: Option<i64>,
    /// `refund:item:<id>:return:<return_id>` or `refund:item:<id>:cancellation`. Also used as the gateway token.
    pub idempotency_key: String,
    pub amount: Paise,
    pub method: String,
    pub status: RefundStatus,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a refund is being issued against. At most one refund exists per (order item, source).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefundSource {
    Return(i64),
    Cancellation,
}

impl RefundSource {
    pub fn idempotency_key(&self, order_item_id: i64) -> String {
        match self {
            RefundSource::Return(return_id) => format!("refund:item:{order_item_id}:return:{return_id}"),
            RefundSource::Cancellation => format!("refund:item:{order_item_id}:cancellation"),
        }
    }

    pub fn return_id(&self) -> Option<i64> {
        match self {
            RefundSource::Return(id) => Some(*id),
            RefundSource::Cancellation => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRefund {
    pub order_item_id: i64,
    pub source: RefundSource,
    pub amount: Paise,
    pub method: String,
}

impl NewRefund {
    pub fn new<S: Into<String>>(order_item_id: i64, source: RefundSource, amount: Paise, method: S) -> Self {
        Self { order_item_id, source, amount, method: method.into() }
    }
}

/// The asynchronous verdict of the payment gateway on a refund or a disbursement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayOutcome {
    Completed { reference: Option<String> },
    Failed { reason: String },
}

//--------------------------------------     SellerBalance     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SellerBalance {
    pub seller_id: SellerId,
    pub available_balance: Paise,
    pub pending_balance: Paise,
    pub total_earned: Paise,
    pub total_paid_out: Paise,
    pub total_refunded: Paise,
    pub last_payout_amount: Option<Paise>,
    pub last_payout_date: Option<DateTime<Utc>>,
    /// Bumped on every write. Writers must present the version they read.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellerBalance {
    pub fn new(seller_id: SellerId) -> Self {
        let now = Utc::now();
        Self {
            seller_id,
            available_balance: Paise::ZERO,
            pending_balance: Paise::ZERO,
            total_earned: Paise::ZERO,
            total_paid_out: Paise::ZERO,
            total_refunded: Paise::ZERO,
            last_payout_amount: None,
            last_payout_date: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `available_balance + pending_balance`
    pub fn balance(&self) -> Paise {
        self.available_balance + self.pending_balance
    }

    /// `total_earned - total_paid_out - total_refunded`
    pub fn net_position(&self) -> Paise {
        self.total_earned - self.total_paid_out - self.total_refunded
    }

    pub fn is_consistent(&self) -> bool {
        self.balance() == self.net_position()
    }
}

//-------------------------------------- BalanceTransaction    ---------------------------------------------------------
/// One immutable ledger row. `amount` is signed: credits are positive, debits negative.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: i64,
    pub seller_id: SellerId,
    pub transaction_type: TransactionType,
    pub amount: Paise,
    pub balance_before: Paise,
    pub balance_after: Paise,
    pub order_item_id: Option<i64>,
    pub refund_id: Option<i64>,
    pub payout_id: Option<i64>,
    /// Set for debits that no payout has absorbed by excluding the item, so the next payout must deduct them.
    pub carry_forward: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      SellerPayout     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SellerPayout {
    pub id: i64,
    pub seller_id: SellerId,
    pub payout_month: i64,
    pub payout_year: i64,
    pub status: PayoutStatus,
    pub gross_sales: Paise,
    pub fees: Paise,
    pub tax: Paise,
    pub refund_deductions: Paise,
    pub previous_balance: Paise,
    pub balance_adjustment: Paise,
    pub net_amount: Paise,
    pub item_count: i64,
    /// The paid payout whose negative net amount is carried in as `previous_balance`, if any.
    pub carried_from_payout_id: Option<i64>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub disbursement_status: Option<DisbursementStatus>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_by: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellerPayout {
    pub fn period(&self) -> PayoutPeriod {
        PayoutPeriod { month: self.payout_month as u32, year: self.payout_year as i32 }
    }
}

/// One row of `payout_items`. Rows with no `payout_id` are the pending-settlement record created on delivery; rows
/// with a `payout_id` are the snapshot of that item inside a specific payout.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PayoutItem {
    pub id: i64,
    pub payout_id: Option<i64>,
    pub order_item_id: i64,
    pub seller_id: SellerId,
    pub item_subtotal: Paise,
    pub allocated_fee: Paise,
    pub allocated_tax: Paise,
    pub settlement_hold_until: DateTime<Utc>,
    /// The sale has been moved from pending to available balance.
    pub is_released: bool,
    pub is_settled: bool,
    pub is_refunded: bool,
    pub refund_id: Option<i64>,
    pub delivered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A carry-forward ledger debit that has been deducted by a payout.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PayoutDeduction {
    pub id: i64,
    pub payout_id: i64,
    pub balance_transaction_id: i64,
    pub transaction_type: TransactionType,
    /// Magnitude of the debit, always positive.
    pub amount: Paise,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PayoutApprovalLog {
    pub id: i64,
    pub payout_id: i64,
    pub action: String,
    pub previous_status: Option<PayoutStatus>,
    pub new_status: PayoutStatus,
    pub performed_by: String,
    pub notes: Option<String>,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayoutPeriod {
    pub month: u32,
    pub year: i32,
}

impl PayoutPeriod {
    pub fn new(month: u32, year: i32) -> Self {
        Self { month, year }
    }

    pub fn containing(ts: DateTime<Utc>) -> Self {
        use chrono::Datelike;
        Self { month: ts.month(), year: ts.year() }
    }
}

impl Display for PayoutPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_item_transitions() {
        use OrderItemStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(ReturnRequested));
        assert!(Shipped.can_transition_to(ReturnRequested));
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Packed.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Delivered));
    }

    #[test]
    fn return_transitions() {
        use ReturnStatus::*;
        assert!(Initiated.can_transition_to(PickupScheduled));
        assert!(SellerReview.can_transition_to(PickupScheduled));
        assert!(PickupScheduled.can_transition_to(PickedUp));
        assert!(!Initiated.can_transition_to(PickedUp));
        assert!(!PickedUp.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Completed));
        assert!(PickedUp.accepts_quality_check());
        assert!(QualityCheck.accepts_quality_check());
        assert!(!PickupScheduled.accepts_quality_check());
        assert!(!Rejected.is_open());
        assert!(Approved.is_open());
    }

    #[test]
    fn payout_transitions() {
        use PayoutStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Paid));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Paid.can_transition_to(Rejected));
    }

    #[test]
    fn status_strings() {
        assert_eq!(OrderItemStatus::ReturnRequested.to_string(), "return_requested");
        assert_eq!("pickup_scheduled".parse::<ReturnStatus>().unwrap(), ReturnStatus::PickupScheduled);
        assert_eq!(TransactionType::from("payout_debit".to_string()), TransactionType::PayoutDebit);
        assert!("shipping".parse::<OrderItemStatus>().is_err());
    }

    #[test]
    fn refund_keys() {
        assert_eq!(RefundSource::Return(4).idempotency_key(12), "refund:item:12:return:4");
        assert_eq!(RefundSource::Cancellation.idempotency_key(12), "refund:item:12:cancellation");
    }

    #[test]
    fn new_order_item_subtotal() {
        let item = NewOrderItem::new("ord-1", SellerId::from("s1"), "listing-1", 3, Paise::from(15_000));
        assert_eq!(item.subtotal, Paise::from(45_000));
    }
}

use crate::{
    db_types::{GatewayOutcome, NewRefund, OrderRefund, RefundStatus},
    traits::{data_objects::InsertRefundResult, SettlementError},
};

/// Storage for the refund processor.
#[allow(async_fn_in_trait)]
pub trait RefundManagement {
    /// Records a refund and debits the seller's ledger, atomically.
    ///
    /// If a refund for the same (order item, source) already exists, nothing is written and the existing refund is
    /// returned as [`InsertRefundResult::AlreadyExists`].
    async fn insert_refund(&self, refund: NewRefund) -> Result<InsertRefundResult, SettlementError>;

    /// `pending -> processing`, storing the gateway's reference.
    async fn mark_refund_dispatched(&self, refund_id: i64, reference: &str) -> Result<OrderRefund, SettlementError>;

    /// Applies the gateway's final verdict. The status is mirrored onto the cancellation, if any, and a completed
    /// refund moves an `approved` return to `refunded`.
    async fn reconcile_refund(&self, refund_id: i64, outcome: GatewayOutcome) -> Result<OrderRefund, SettlementError>;

    async fn fetch_refund(&self, refund_id: i64) -> Result<Option<OrderRefund>, SettlementError>;

    async fn fetch_refund_by_key(&self, idempotency_key: &str) -> Result<Option<OrderRefund>, SettlementError>;

    async fn fetch_refunds_for_item(&self, order_item_id: i64) -> Result<Vec<OrderRefund>, SettlementError>;

    async fn fetch_refunds_with_status(&self, status: RefundStatus) -> Result<Vec<OrderRefund>, SettlementError>;
}

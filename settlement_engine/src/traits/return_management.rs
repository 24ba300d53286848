use crate::{
    db_types::{Actor, NewReturnRequest, OrderReturn, QcResult, QualityCheck, ReturnStatus, ReturnTracking},
    traits::{
        data_objects::{QualityCheckOutcome, ReturnChanged, ReturnRequested},
        SettlementError,
    },
};

/// Storage for the return and quality-check workflow.
#[allow(async_fn_in_trait)]
pub trait ReturnManagement {
    /// Moves the item to `return_requested` and opens a return in `initiated`, atomically. Fails if the item already
    /// has an open return.
    async fn insert_return(&self, request: NewReturnRequest) -> Result<ReturnRequested, SettlementError>;

    /// A plain return status change, with a tracking entry.
    async fn update_return_status(
        &self,
        return_id: i64,
        expected: ReturnStatus,
        target: ReturnStatus,
        actor: &Actor,
        location: Option<String>,
        notes: Option<String>,
    ) -> Result<ReturnChanged, SettlementError>;

    /// Records the one authoritative inspection result for a return. A pass approves the return and refunds the full
    /// item subtotal in the same transaction; a failure rejects it.
    async fn insert_quality_check(
        &self,
        return_id: i64,
        result: QcResult,
        remarks: Option<String>,
        actor: &Actor,
        refund_method: &str,
    ) -> Result<QualityCheckOutcome, SettlementError>;

    async fn fetch_return(&self, return_id: i64) -> Result<Option<OrderReturn>, SettlementError>;

    async fn fetch_returns_for_item(&self, order_item_id: i64) -> Result<Vec<OrderReturn>, SettlementError>;

    async fn fetch_return_tracking(&self, return_id: i64) -> Result<Vec<ReturnTracking>, SettlementError>;

    async fn fetch_quality_check(&self, return_id: i64) -> Result<Option<QualityCheck>, SettlementError>;
}

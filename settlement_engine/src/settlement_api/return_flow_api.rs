use std::fmt::Debug;

use log::*;

use crate::{
    config::SettlementConfig,
    db_types::{Actor, OrderReturn, QcResult, ReturnStatus},
    events::{EventProducers, ReturnQualityCheckEvent},
    settlement_api::refund_api::RefundApi,
    traits::{
        InsertRefundResult,
        PaymentGateway,
        QualityCheckOutcome,
        ReturnChanged,
        ReturnDetail,
        SettlementDatabase,
        SettlementError,
    },
};

/// `ReturnFlowApi` takes an open return from pickup through the quality check.
///
/// ```text
/// initiated -> seller_review -> pickup_scheduled -> picked_up -> quality_check
/// picked_up | quality_check --QC--> approved | rejected
/// approved -> refunded (when the refund completes) -> completed
/// ```
///
/// Returns are opened with [`crate::OrderFlowApi::request_return`].
pub struct ReturnFlowApi<B, G> {
    db: B,
    refunds: RefundApi<B, G>,
    producers: EventProducers,
    config: SettlementConfig,
}

impl<B, G> Debug for ReturnFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReturnFlowApi")
    }
}

impl<B, G> ReturnFlowApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    pub fn new(db: B, gateway: G, producers: EventProducers, config: SettlementConfig) -> Self {
        let refunds = RefundApi::new(db.clone(), gateway, producers.clone());
        Self { db, refunds, producers, config }
    }

    /// A plain return transition. `approved`, `rejected` and `refunded` cannot be reached this way: they are the
    /// outcome of a quality check or a completed refund.
    pub async fn transition(
        &self,
        return_id: i64,
        expected: ReturnStatus,
        target: ReturnStatus,
        actor: &Actor,
        location: Option<String>,
        notes: Option<String>,
    ) -> Result<ReturnChanged, SettlementError> {
        if !expected.can_transition_to(target) {
            debug!("↩️ Refusing to move return #{return_id} from {expected} to {target}");
            return Err(SettlementError::invalid_transition(format!("Return #{return_id}"), expected, target));
        }
        let change = self.db.update_return_status(return_id, expected, target, actor, location, notes).await?;
        debug!("↩️ Return #{return_id} moved from {expected} to {target} by {actor}");
        Ok(change)
    }

    pub async fn schedule_pickup(
        &self,
        return_id: i64,
        expected: ReturnStatus,
        actor: &Actor,
        notes: Option<String>,
    ) -> Result<ReturnChanged, SettlementError> {
        self.transition(return_id, expected, ReturnStatus::PickupScheduled, actor, None, notes).await
    }

    pub async fn confirm_pickup(
        &self,
        return_id: i64,
        actor: &Actor,
        location: Option<String>,
    ) -> Result<ReturnChanged, SettlementError> {
        self.transition(return_id, ReturnStatus::PickupScheduled, ReturnStatus::PickedUp, actor, location, None).await
    }

    /// Records the inspection result. Only a return that is `picked_up` or `quality_check` can be inspected, and only
    /// once.
    ///
    /// A pass approves the return and refunds the item's full subtotal. A failure rejects the return for good; the
    /// buyer keeps the item and the sale stands.
    pub async fn record_quality_check(
        &self,
        return_id: i64,
        result: QcResult,
        remarks: Option<String>,
        actor: &Actor,
    ) -> Result<QualityCheckOutcome, SettlementError> {
        let method = &self.config.default_refund_method;
        let mut outcome = self.db.insert_quality_check(return_id, result, remarks, actor, method).await?;
        info!("↩️ Return #{return_id} inspected by {actor}: {result}");
        let event = ReturnQualityCheckEvent::new(
            outcome.change.order_return.clone(),
            outcome.change.old_status,
            outcome.quality_check.clone(),
            outcome.refund.as_ref().map(|r| r.refund().clone()),
        );
        self.producers.publish_return_quality_check(event).await;
        outcome.refund = match outcome.refund.take() {
            Some(InsertRefundResult::Inserted(refund)) => {
                Some(InsertRefundResult::Inserted(self.refunds.refund_created(refund).await))
            },
            other => other,
        };
        Ok(outcome)
    }

    pub async fn fetch_return(&self, return_id: i64) -> Result<Option<OrderReturn>, SettlementError> {
        self.db.fetch_return(return_id).await
    }

    pub async fn returns_for_item(&self, order_item_id: i64) -> Result<Vec<OrderReturn>, SettlementError> {
        self.db.fetch_returns_for_item(order_item_id).await
    }

    /// The return with its tracking trail and quality check.
    pub async fn return_detail(&self, return_id: i64) -> Result<ReturnDetail, SettlementError> {
        let order_return = self
            .db
            .fetch_return(return_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Return #{return_id}")))?;
        let tracking = self.db.fetch_return_tracking(return_id).await?;
        let quality_check = self.db.fetch_quality_check(return_id).await?;
        Ok(ReturnDetail { order_return, tracking, quality_check })
    }
}

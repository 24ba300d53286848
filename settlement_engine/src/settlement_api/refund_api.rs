//! The refund processor's outward side: gateway dispatch, reconciliation and the retry sweep.

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{GatewayOutcome, NewRefund, OrderRefund, RefundStatus},
    events::{EventProducers, RefundUpdatedEvent},
    traits::{
        DispatchResult,
        GatewayError,
        GatewayRefundRequest,
        InsertRefundResult,
        PaymentGateway,
        ReconciliationResult,
        SettlementDatabase,
        SettlementError,
    },
};

/// `RefundApi` records refunds and drives them through the payment gateway.
///
/// The ledger debit is written together with the refund record. Everything that involves the gateway happens after
/// that commit, so a gateway outage leaves the refund `pending` (and the seller debited) until
/// [`RefundApi::retry_pending_refunds`] gets it through. A refund the gateway refuses is `failed` straight away.
#[derive(Clone)]
pub struct RefundApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for RefundApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefundApi")
    }
}

impl<B, G> RefundApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }
}

impl<B, G> RefundApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    /// Records a refund and debits the seller, then sends it to the gateway.
    ///
    /// Asking for the same (order item, source) refund again is not an error: the existing refund comes back as
    /// [`InsertRefundResult::AlreadyExists`] and nothing else happens.
    pub async fn process_refund(&self, refund: NewRefund) -> Result<InsertRefundResult, SettlementError> {
        let result = self.db.insert_refund(refund).await?;
        match result {
            InsertRefundResult::Inserted(refund) => Ok(InsertRefundResult::Inserted(self.refund_created(refund).await)),
            InsertRefundResult::AlreadyExists(refund) => {
                debug!("💸️ Refund #{} was already recorded as {}", refund.id, refund.idempotency_key);
                Ok(InsertRefundResult::AlreadyExists(refund))
            },
        }
    }

    /// Announces a refund that was just committed (by this API or as part of a cancellation or quality check) and
    /// tries to dispatch it. Returns the refund in its latest known state.
    pub(crate) async fn refund_created(&self, refund: OrderRefund) -> OrderRefund {
        self.producers.publish_refund_updated(RefundUpdatedEvent::new(refund.clone())).await;
        match self.dispatch(&refund).await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                warn!("💸️ Refund #{} stays pending. It will be retried. {e}", refund.id);
                refund
            },
        }
    }

    /// Hands a `pending` refund to the gateway. The idempotency key doubles as the gateway token, so a retry after a
    /// lost response cannot pay the buyer twice.
    ///
    /// A refund the gateway refuses outright is marked `failed` (and so is its cancellation, if it has one) and comes
    /// back in that state. Only an unreachable gateway is an error, and leaves the refund `pending`.
    pub async fn dispatch(&self, refund: &OrderRefund) -> Result<OrderRefund, SettlementError> {
        if refund.status != RefundStatus::Pending {
            return Err(SettlementError::invalid_transition(
                format!("Refund #{}", refund.id),
                refund.status,
                RefundStatus::Processing,
            ));
        }
        let request = GatewayRefundRequest {
            idempotency_token: refund.idempotency_key.clone(),
            refund_id: refund.id,
            order_item_id: refund.order_item_id,
            amount: refund.amount,
            method: refund.method.clone(),
        };
        let receipt = match self.gateway.issue_refund(request).await {
            Ok(receipt) => receipt,
            Err(GatewayError::Rejected(reason)) => {
                warn!("💸️ The gateway refused refund #{}: {reason}", refund.id);
                return self.reconcile_refund(refund.id, GatewayOutcome::Failed { reason }).await;
            },
            Err(e) => return Err(e.into()),
        };
        trace!("💸️ Gateway accepted refund #{} as {}", refund.id, receipt.reference);
        let refund = self.db.mark_refund_dispatched(refund.id, &receipt.reference).await?;
        self.producers.publish_refund_updated(RefundUpdatedEvent::new(refund.clone())).await;
        Ok(refund)
    }

    /// Feeds the gateway's verdict back. Repeating a verdict is harmless.
    pub async fn reconcile_refund(
        &self,
        refund_id: i64,
        outcome: GatewayOutcome,
    ) -> Result<OrderRefund, SettlementError> {
        let before = self
            .db
            .fetch_refund(refund_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Refund #{refund_id}")))?;
        let refund = self.db.reconcile_refund(refund_id, outcome).await?;
        if refund.status != before.status {
            if refund.status == RefundStatus::Failed {
                warn!(
                    "💸️ Refund #{refund_id} of {} failed at the gateway: {}. It needs manual follow-up.",
                    refund.amount,
                    refund.failure_reason.as_deref().unwrap_or("no reason given")
                );
            }
            self.producers.publish_refund_updated(RefundUpdatedEvent::new(refund.clone())).await;
        }
        Ok(refund)
    }

    /// Tries every refund that is still `pending` again. Failures are reported, not fatal.
    pub async fn retry_pending_refunds(&self) -> Result<DispatchResult, SettlementError> {
        let pending = self.db.fetch_refunds_with_status(RefundStatus::Pending).await?;
        let mut result = DispatchResult::default();
        for refund in pending {
            match self.dispatch(&refund).await {
                Ok(rejected) if rejected.status == RefundStatus::Failed => result.rejected.push(rejected),
                Ok(dispatched) => result.dispatched.push(dispatched),
                Err(e) => {
                    warn!("💸️ Could not dispatch refund #{}: {e}", refund.id);
                    result.failed.push((refund.id, e.to_string()));
                },
            }
        }
        if !result.dispatched.is_empty() || !result.rejected.is_empty() || !result.failed.is_empty() {
            info!(
                "💸️ Refund sweep: {} dispatched, {} refused, {} still pending",
                result.dispatched.len(),
                result.rejected.len(),
                result.failed.len()
            );
        }
        Ok(result)
    }

    /// Asks the gateway about every `processing` refund and applies the outcomes it has reached. Refunds the gateway
    /// is still working on are left alone.
    pub async fn poll_processing_refunds(&self) -> Result<ReconciliationResult, SettlementError> {
        let processing = self.db.fetch_refunds_with_status(RefundStatus::Processing).await?;
        let mut result = ReconciliationResult::default();
        for refund in processing {
            let Some(reference) = refund.gateway_reference.as_deref() else {
                warn!("💸️ Refund #{} is processing but has no gateway reference", refund.id);
                result.errors.push((refund.id, "No gateway reference".into()));
                continue;
            };
            let outcome = match self.gateway.refund_outcome(reference).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => {
                    result.in_progress.push(refund.id);
                    continue;
                },
                Err(e) => {
                    warn!("💸️ Could not fetch the outcome of refund #{} ({reference}): {e}", refund.id);
                    result.errors.push((refund.id, e.to_string()));
                    continue;
                },
            };
            match self.reconcile_refund(refund.id, outcome).await {
                Ok(r) if r.status == RefundStatus::Completed => result.completed.push(r.id),
                Ok(r) => result.failed.push(r.id),
                Err(e) => {
                    warn!("💸️ Could not reconcile refund #{}: {e}", refund.id);
                    result.errors.push((refund.id, e.to_string()));
                },
            }
        }
        if result.settled_count() > 0 {
            info!(
                "💸️ Refund reconciliation: {} completed, {} failed, {} still processing",
                result.completed.len(),
                result.failed.len(),
                result.in_progress.len()
            );
        }
        Ok(result)
    }

    pub async fn fetch_refund(&self, refund_id: i64) -> Result<Option<OrderRefund>, SettlementError> {
        self.db.fetch_refund(refund_id).await
    }

    pub async fn fetch_refund_by_key(&self, idempotency_key: &str) -> Result<Option<OrderRefund>, SettlementError> {
        self.db.fetch_refund_by_key(idempotency_key).await
    }

    pub async fn refunds_for_item(&self, order_item_id: i64) -> Result<Vec<OrderRefund>, SettlementError> {
        self.db.fetch_refunds_for_item(order_item_id).await
    }
}

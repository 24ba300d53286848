use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        Actor,
        ActorRole,
        DisbursementStatus,
        GatewayOutcome,
        Paise,
        PayoutItem,
        PayoutPeriod,
        PayoutStatus,
        SellerId,
        SellerPayout,
    },
    events::{EventProducers, PayoutStatusChangedEvent},
    traits::{
        BatchResult,
        GatewayError,
        GatewayPayoutRequest,
        PaymentGateway,
        PayoutDetail,
        PayoutGenerationResult,
        ReconciliationResult,
        SettlementDatabase,
        SettlementError,
    },
};

/// The payment method recorded on payouts that were disbursed through the payment gateway.
pub const GATEWAY_PAYMENT_METHOD: &str = "gateway";

/// `PayoutApi` builds the periodic seller payouts and runs them through admin approval:
///
/// ```text
/// pending -> approved -> paid
/// pending -> rejected
/// ```
///
/// Nothing touches the ledger until a payout is paid. A rejected payout releases its items for the next run.
#[derive(Clone)]
pub struct PayoutApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for PayoutApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutApi")
    }
}

impl<B, G> PayoutApi<B, G>
where
    B: SettlementDatabase,
    G: PaymentGateway,
{
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers }
    }

    /// Generates the seller's payout for `period` from the items whose hold has elapsed at `as_of`. Running it again
    /// for the same period returns the payout that already exists.
    pub async fn generate(
        &self,
        seller_id: &SellerId,
        period: PayoutPeriod,
        as_of: DateTime<Utc>,
    ) -> Result<PayoutGenerationResult, SettlementError> {
        let result = self.db.generate_payout(seller_id, period, as_of).await?;
        if let PayoutGenerationResult::Inserted(payout) = &result {
            self.notify(payout, None).await;
        }
        Ok(result)
    }

    /// Runs [`Self::generate`] for every seller with unsettled deliveries. One seller's failure is logged and reported
    /// in the result; the others still get their payouts.
    pub async fn generate_all(&self, period: PayoutPeriod, as_of: DateTime<Utc>) -> Result<BatchResult, SettlementError> {
        let sellers = self.db.fetch_sellers_with_unsettled_items().await?;
        debug!("🏦️ Generating {period} payouts for {} sellers", sellers.len());
        let mut batch = BatchResult::default();
        for seller in sellers {
            match self.generate(&seller, period, as_of).await {
                Ok(PayoutGenerationResult::Inserted(p)) => batch.generated.push(p),
                Ok(PayoutGenerationResult::AlreadyExists(p)) => batch.already_existed.push(p),
                Ok(PayoutGenerationResult::NothingToSettle) => batch.nothing_to_settle.push(seller),
                Err(e) => {
                    error!("🏦️ Could not generate the {period} payout for seller {seller}: {e}");
                    batch.failed.push((seller, e.to_string()));
                },
            }
        }
        info!(
            "🏦️ {period} batch: {} generated, {} already existed, {} with nothing to settle, {} failed",
            batch.generated.len(),
            batch.already_existed.len(),
            batch.nothing_to_settle.len(),
            batch.failed.len()
        );
        Ok(batch)
    }

    /// Approves a pending payout. `balance_adjustment` replaces any manual adjustment on the payout.
    pub async fn approve(
        &self,
        payout_id: i64,
        admin: &Actor,
        balance_adjustment: Option<Paise>,
        admin_notes: Option<String>,
    ) -> Result<SellerPayout, SettlementError> {
        require_admin(admin, "approve payouts")?;
        let payout = self.db.approve_payout(payout_id, admin, balance_adjustment, admin_notes).await?;
        self.notify(&payout, Some(PayoutStatus::Pending)).await;
        Ok(payout)
    }

    pub async fn reject(&self, payout_id: i64, admin: &Actor, reason: &str) -> Result<SellerPayout, SettlementError> {
        require_admin(admin, "reject payouts")?;
        if reason.trim().is_empty() {
            return Err(SettlementError::ValidationError("A rejection reason is required".into()));
        }
        let payout = self.db.reject_payout(payout_id, admin, reason).await?;
        self.notify(&payout, Some(PayoutStatus::Pending)).await;
        Ok(payout)
    }

    /// Records that an admin paid the seller outside the gateway (e.g. a bank transfer with reference `TXN1`).
    pub async fn mark_paid(
        &self,
        payout_id: i64,
        admin: &Actor,
        payment_method: &str,
        payment_reference: &str,
    ) -> Result<SellerPayout, SettlementError> {
        require_admin(admin, "pay out")?;
        if payment_method.trim().is_empty() || payment_reference.trim().is_empty() {
            return Err(SettlementError::ValidationError("A payment method and reference are required".into()));
        }
        let payout = self
            .db
            .mark_payout_paid(payout_id, admin, payment_method, payment_reference, DisbursementStatus::Confirmed)
            .await?;
        self.notify(&payout, Some(PayoutStatus::Approved)).await;
        Ok(payout)
    }

    /// Pays an approved payout through the gateway.
    ///
    /// The payout is recorded `paid` (and the ledger debited) first, with an `unconfirmed` disbursement. Then the
    /// gateway is asked to move the money, with `payout:<id>` as the idempotency token. If the gateway cannot be
    /// reached the payout stays `paid`/`unconfirmed` and calling `disburse` again retries the transfer. If the gateway
    /// refuses the transfer, the disbursement is marked `failed` straight away. Calling `disburse` again after a
    /// `failed` disbursement retries it.
    pub async fn disburse(&self, payout_id: i64, admin: &Actor) -> Result<SellerPayout, SettlementError> {
        require_admin(admin, "pay out")?;
        let payout = self.fetch_existing(payout_id).await?;
        let token = disbursement_token(payout_id);
        let payout = match (payout.status, payout.disbursement_status) {
            (PayoutStatus::Approved, _) => {
                let status = if payout.net_amount.is_positive() {
                    DisbursementStatus::Unconfirmed
                } else {
                    DisbursementStatus::Confirmed
                };
                let paid =
                    self.db.mark_payout_paid(payout_id, admin, GATEWAY_PAYMENT_METHOD, &token, status).await?;
                self.notify(&paid, Some(PayoutStatus::Approved)).await;
                paid
            },
            (PayoutStatus::Paid, Some(DisbursementStatus::Failed)) if is_gateway_payout(&payout) => {
                let notes = Some(format!("Retried by {admin}"));
                self.db
                    .update_disbursement_status(
                        payout_id,
                        DisbursementStatus::Failed,
                        DisbursementStatus::Unconfirmed,
                        Some(token.clone()),
                        notes,
                    )
                    .await?
            },
            (PayoutStatus::Paid, Some(DisbursementStatus::Unconfirmed))
                if is_gateway_payout(&payout) && payout.payment_reference.as_deref() == Some(token.as_str()) =>
            {
                payout
            },
            (status, _) => {
                return Err(SettlementError::invalid_transition(
                    format!("Payout #{payout_id}"),
                    status,
                    "disbursed through the gateway",
                ));
            },
        };
        if !payout.net_amount.is_positive() {
            info!("🏦️ Payout #{payout_id} has nothing to transfer (net {})", payout.net_amount);
            return Ok(payout);
        }
        let request = GatewayPayoutRequest {
            idempotency_token: token,
            payout_id,
            seller_id: payout.seller_id.clone(),
            amount: payout.net_amount,
        };
        match self.gateway.disburse_payout(request).await {
            Ok(receipt) => {
                let notes = Some("Accepted by the gateway".to_string());
                let payout = self
                    .db
                    .update_disbursement_status(
                        payout_id,
                        DisbursementStatus::Unconfirmed,
                        DisbursementStatus::Unconfirmed,
                        Some(receipt.reference.clone()),
                        notes,
                    )
                    .await?;
                info!("🏦️ Payout #{payout_id} of {} sent to the gateway as {}", payout.net_amount, receipt.reference);
                Ok(payout)
            },
            Err(GatewayError::Rejected(reason)) => {
                warn!("🏦️ The gateway refused payout #{payout_id}: {reason}");
                self.reconcile_disbursement(payout_id, GatewayOutcome::Failed { reason }).await
            },
            Err(e) => {
                warn!("🏦️ The gateway did not accept payout #{payout_id}. Call disburse again to retry. {e}");
                Ok(payout)
            },
        }
    }

    /// Feeds the gateway's verdict on a disbursement back. Repeating a verdict is harmless.
    pub async fn reconcile_disbursement(
        &self,
        payout_id: i64,
        outcome: GatewayOutcome,
    ) -> Result<SellerPayout, SettlementError> {
        let payout = self.fetch_existing(payout_id).await?;
        let (target, reference, notes) = match outcome {
            GatewayOutcome::Completed { reference } => (DisbursementStatus::Confirmed, reference, None),
            GatewayOutcome::Failed { reason } => (DisbursementStatus::Failed, None, Some(reason)),
        };
        if payout.disbursement_status == Some(target) {
            debug!("🏦️ Disbursement of payout #{payout_id} is already {target}");
            return Ok(payout);
        }
        let payout = self
            .db
            .update_disbursement_status(payout_id, DisbursementStatus::Unconfirmed, target, reference, notes)
            .await?;
        match target {
            DisbursementStatus::Failed => {
                warn!("🏦️ Disbursement of payout #{payout_id} to seller {} failed", payout.seller_id)
            },
            _ => info!("🏦️ Disbursement of payout #{payout_id} to seller {} is {target}", payout.seller_id),
        }
        self.notify(&payout, Some(PayoutStatus::Paid)).await;
        Ok(payout)
    }

    /// Asks the gateway about every disbursement it accepted that is still `unconfirmed`, and applies the outcomes
    /// it has reached. Disbursements the gateway never accepted are left for [`PayoutApi::disburse`] to retry.
    pub async fn poll_unconfirmed_disbursements(&self) -> Result<ReconciliationResult, SettlementError> {
        let unconfirmed = self.db.fetch_payouts_with_disbursement_status(DisbursementStatus::Unconfirmed).await?;
        let mut result = ReconciliationResult::default();
        for payout in unconfirmed.into_iter().filter(is_gateway_payout) {
            let reference = match payout.payment_reference.as_deref() {
                Some(r) if r != disbursement_token(payout.id) => r.to_string(),
                _ => {
                    trace!("🏦️ Payout #{} has not been accepted by the gateway yet", payout.id);
                    continue;
                },
            };
            let outcome = match self.gateway.payout_outcome(&reference).await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => {
                    result.in_progress.push(payout.id);
                    continue;
                },
                Err(e) => {
                    warn!("🏦️ Could not fetch the outcome of payout #{} ({reference}): {e}", payout.id);
                    result.errors.push((payout.id, e.to_string()));
                    continue;
                },
            };
            match self.reconcile_disbursement(payout.id, outcome).await {
                Ok(p) if p.disbursement_status == Some(DisbursementStatus::Confirmed) => result.completed.push(p.id),
                Ok(p) => result.failed.push(p.id),
                Err(e) => {
                    warn!("🏦️ Could not reconcile the disbursement of payout #{}: {e}", payout.id);
                    result.errors.push((payout.id, e.to_string()));
                },
            }
        }
        if result.settled_count() > 0 {
            info!(
                "🏦️ Disbursement reconciliation: {} confirmed, {} failed, {} still in progress",
                result.completed.len(),
                result.failed.len(),
                result.in_progress.len()
            );
        }
        Ok(result)
    }

    pub async fn fetch_payout(&self, payout_id: i64) -> Result<Option<SellerPayout>, SettlementError> {
        self.db.fetch_payout(payout_id).await
    }

    pub async fn payouts_for_seller(&self, seller_id: &SellerId) -> Result<Vec<SellerPayout>, SettlementError> {
        self.db.fetch_payouts_for_seller(seller_id).await
    }

    /// The payout with its item snapshots, deductions and approval trail.
    pub async fn payout_detail(&self, payout_id: i64) -> Result<PayoutDetail, SettlementError> {
        let payout = self.fetch_existing(payout_id).await?;
        let items = self.db.fetch_payout_items(payout_id).await?;
        let deductions = self.db.fetch_payout_deductions(payout_id).await?;
        let logs = self.db.fetch_approval_logs(payout_id).await?;
        Ok(PayoutDetail { payout, items, deductions, logs })
    }

    /// The seller's delivered items and where each stands in settlement.
    pub async fn settlement_records(&self, seller_id: &SellerId) -> Result<Vec<PayoutItem>, SettlementError> {
        self.db.fetch_settlement_records(seller_id).await
    }

    async fn fetch_existing(&self, payout_id: i64) -> Result<SellerPayout, SettlementError> {
        self.db.fetch_payout(payout_id).await?.ok_or_else(|| SettlementError::NotFound(format!("Payout #{payout_id}")))
    }

    async fn notify(&self, payout: &SellerPayout, old_status: Option<PayoutStatus>) {
        let event = PayoutStatusChangedEvent::new(payout.clone(), old_status);
        self.producers.publish_payout_status_changed(event).await;
    }
}

fn require_admin(actor: &Actor, action: &str) -> Result<(), SettlementError> {
    if actor.role == ActorRole::Admin {
        Ok(())
    } else {
        Err(SettlementError::ValidationError(format!("Only admins can {action}")))
    }
}

fn disbursement_token(payout_id: i64) -> String {
    format!("payout:{payout_id}")
}

fn is_gateway_payout(payout: &SellerPayout) -> bool {
    payout.payment_method.as_deref() == Some(GATEWAY_PAYMENT_METHOD)
}

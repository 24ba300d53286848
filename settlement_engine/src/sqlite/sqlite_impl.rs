//! `SqliteDatabase` is the SQLite backend of the settlement engine.
//!
//! It implements all the traits defined in the [`crate::traits`] module. Every method that changes state opens one
//! transaction, calls through to the functions in [`super::db`], and commits only if all of them succeeded. Dropping
//! the transaction on an early `?` return rolls everything back.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate::MigrateError, SqlitePool};

use super::db::{db_url, ledger, new_pool, order_items, payouts, refunds, returns};
use crate::{
    config::{allocate_fees, HoldPolicy},
    db_types::{
        Actor,
        BalanceTransaction,
        DisbursementStatus,
        GatewayOutcome,
        NewOrderItem,
        NewOrderPayment,
        NewRefund,
        NewReturnRequest,
        OrderCancellation,
        OrderItem,
        OrderItemStatus,
        OrderPayment,
        OrderRefund,
        OrderReturn,
        OrderStatusHistory,
        Paise,
        PayoutApprovalLog,
        PayoutDeduction,
        PayoutItem,
        PayoutPeriod,
        PayoutStatus,
        QcResult,
        QualityCheck,
        RefundSource,
        RefundStatus,
        ReturnStatus,
        ReturnTracking,
        SellerBalance,
        SellerId,
        SellerPayout,
    },
    ledger::LedgerEntry,
    payout_batch::{past_hold, Deduction, PayoutTotals},
    traits::{
        CancellationResult,
        DeliveryResult,
        FulfillmentManagement,
        InsertRefundResult,
        LedgerManagement,
        OrderItemChanged,
        PayoutGenerationResult,
        PayoutManagement,
        QualityCheckOutcome,
        RefundManagement,
        ReturnChanged,
        ReturnManagement,
        ReturnRequested,
        SettlementDatabase,
        SettlementError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }
}

impl FulfillmentManagement for SqliteDatabase {
    async fn insert_order_item(&self, item: NewOrderItem, actor: &Actor) -> Result<OrderItem, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let item = order_items::insert_order_item(item, actor, &mut tx).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn insert_order_payment(&self, payment: NewOrderPayment) -> Result<(OrderPayment, bool), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        order_items::idempotent_insert_payment(payment, &mut conn).await
    }

    async fn fetch_order_item(&self, id: i64) -> Result<Option<OrderItem>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let item = order_items::fetch_order_item(id, &mut conn).await?;
        Ok(item)
    }

    async fn fetch_order_items_for_order(&self, order_id: &str) -> Result<Vec<OrderItem>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let items = order_items::fetch_order_items_for_order(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_order_payment(&self, order_id: &str) -> Result<Option<OrderPayment>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let payment = order_items::fetch_payment(order_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_status_history(&self, order_item_id: i64) -> Result<Vec<OrderStatusHistory>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let history = order_items::fetch_history(order_item_id, &mut conn).await?;
        Ok(history)
    }

    async fn fetch_cancellation(&self, order_item_id: i64) -> Result<Option<OrderCancellation>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let cancellation = order_items::fetch_cancellation(order_item_id, &mut conn).await?;
        Ok(cancellation)
    }

    async fn update_order_item_status(
        &self,
        id: i64,
        expected: OrderItemStatus,
        target: OrderItemStatus,
        actor: &Actor,
        remarks: Option<String>,
    ) -> Result<OrderItemChanged, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let change = order_items::transition(id, expected, target, actor, remarks, &mut tx).await?;
        tx.commit().await?;
        Ok(change)
    }

    /// In a single atomic transaction,
    /// * moves the item to `delivered`,
    /// * works out the hold deadline (the seller's earlier deliveries matter for the monthly policy),
    /// * freezes the item's share of the order's gateway fee and tax,
    /// * credits the subtotal to the seller's pending balance,
    /// * creates the pending-settlement record.
    async fn deliver_order_item(
        &self,
        id: i64,
        expected: OrderItemStatus,
        actor: &Actor,
        remarks: Option<String>,
        hold_policy: &HoldPolicy,
        delivered_at: DateTime<Utc>,
    ) -> Result<DeliveryResult, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let change = order_items::transition(id, expected, OrderItemStatus::Delivered, actor, remarks, &mut tx).await?;
        let item = &change.item;
        let prior_deliveries = payouts::count_settlement_records(&item.seller_id, &mut tx).await?;
        let hold_until = hold_policy.hold_until(delivered_at, prior_deliveries);
        let payment = order_items::fetch_payment(&item.order_id, &mut tx).await?;
        let (fee, tax) = allocate_fees(payment.as_ref(), item.subtotal);
        ledger::post_entry(&item.seller_id, LedgerEntry::sale_credit(item.id, item.subtotal), &mut tx).await?;
        let settlement =
            payouts::insert_settlement_record(item, fee, tax, hold_until, delivered_at, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "📦️ Order item #{id} delivered. {} credited to seller {}, held until {hold_until}",
            item.subtotal, item.seller_id
        );
        Ok(DeliveryResult { change, settlement })
    }

    async fn cancel_order_item(
        &self,
        id: i64,
        expected: OrderItemStatus,
        actor: &Actor,
        reason: Option<String>,
        refund_method: &str,
    ) -> Result<CancellationResult, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let change =
            order_items::transition(id, expected, OrderItemStatus::Cancelled, actor, reason.clone(), &mut tx).await?;
        let cancellation = order_items::insert_cancellation(id, actor, reason, &mut tx).await?;
        let new_refund = NewRefund::new(id, RefundSource::Cancellation, change.item.subtotal, refund_method);
        let refund = refunds::process_refund(new_refund, &mut tx).await?;
        tx.commit().await?;
        debug!("📦️ Order item #{id} cancelled by {actor}. Refund #{} issued", refund.refund().id);
        Ok(CancellationResult { change, cancellation, refund })
    }
}

impl ReturnManagement for SqliteDatabase {
    async fn insert_return(&self, request: NewReturnRequest) -> Result<ReturnRequested, SettlementError> {
        let NewReturnRequest { order_item_id, expected_status, buyer, reason, return_type } = request;
        let mut tx = self.pool.begin().await?;
        let change = order_items::transition(
            order_item_id,
            expected_status,
            OrderItemStatus::ReturnRequested,
            &buyer,
            Some(reason.clone()),
            &mut tx,
        )
        .await?;
        let order_return = returns::insert_return(order_item_id, &buyer, &reason, &return_type, &mut tx).await?;
        tx.commit().await?;
        Ok(ReturnRequested { change, order_return })
    }

    async fn update_return_status(
        &self,
        return_id: i64,
        expected: ReturnStatus,
        target: ReturnStatus,
        actor: &Actor,
        location: Option<String>,
        notes: Option<String>,
    ) -> Result<ReturnChanged, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let change = returns::transition(return_id, expected, target, actor, location, notes, &mut tx).await?;
        tx.commit().await?;
        Ok(change)
    }

    async fn insert_quality_check(
        &self,
        return_id: i64,
        result: QcResult,
        remarks: Option<String>,
        actor: &Actor,
        refund_method: &str,
    ) -> Result<QualityCheckOutcome, SettlementError> {
        let target = match result {
            QcResult::Passed => ReturnStatus::Approved,
            QcResult::Failed => ReturnStatus::Rejected,
        };
        let mut tx = self.pool.begin().await?;
        let order_return = returns::fetch_existing_return(return_id, &mut tx).await?;
        if !order_return.status.accepts_quality_check() {
            return Err(SettlementError::invalid_transition(
                format!("Return #{return_id}"),
                order_return.status,
                target,
            ));
        }
        let quality_check = returns::insert_quality_check(return_id, result, remarks.clone(), actor, &mut tx).await?;
        let change =
            returns::transition(return_id, order_return.status, target, actor, None, remarks, &mut tx).await?;
        let refund = match result {
            QcResult::Passed => {
                let item = order_items::fetch_existing_item(order_return.order_item_id, &mut tx).await?;
                let new_refund = NewRefund::new(item.id, RefundSource::Return(return_id), item.subtotal, refund_method);
                Some(refunds::process_refund(new_refund, &mut tx).await?)
            },
            QcResult::Failed => None,
        };
        tx.commit().await?;
        debug!("↩️ Quality check on return #{return_id} {result}. Return is now {target}");
        Ok(QualityCheckOutcome { change, quality_check, refund })
    }

    async fn fetch_return(&self, return_id: i64) -> Result<Option<OrderReturn>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let order_return = returns::fetch_return(return_id, &mut conn).await?;
        Ok(order_return)
    }

    async fn fetch_returns_for_item(&self, order_item_id: i64) -> Result<Vec<OrderReturn>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let result = returns::fetch_returns_for_item(order_item_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_return_tracking(&self, return_id: i64) -> Result<Vec<ReturnTracking>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let tracking = returns::fetch_tracking(return_id, &mut conn).await?;
        Ok(tracking)
    }

    async fn fetch_quality_check(&self, return_id: i64) -> Result<Option<QualityCheck>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let qc = returns::fetch_quality_check(return_id, &mut conn).await?;
        Ok(qc)
    }
}

impl RefundManagement for SqliteDatabase {
    async fn insert_refund(&self, refund: NewRefund) -> Result<InsertRefundResult, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let result = refunds::process_refund(refund, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn mark_refund_dispatched(&self, refund_id: i64, reference: &str) -> Result<OrderRefund, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let refund = refunds::fetch_existing_refund(refund_id, &mut tx).await?;
        if refund.status != RefundStatus::Pending {
            return Err(SettlementError::invalid_transition(
                format!("Refund #{refund_id}"),
                refund.status,
                RefundStatus::Processing,
            ));
        }
        let refund = refunds::update_status(
            refund_id,
            RefundStatus::Pending,
            RefundStatus::Processing,
            Some(reference.to_string()),
            None,
            &mut tx,
        )
        .await?;
        if let Some(cancellation_id) = refund.cancellation_id {
            order_items::update_cancellation_refund_status(cancellation_id, RefundStatus::Processing, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("💸️ Refund #{refund_id} handed to the gateway. Reference {reference}");
        Ok(refund)
    }

    /// Applying the same verdict twice returns the refund unchanged.
    async fn reconcile_refund(&self, refund_id: i64, outcome: GatewayOutcome) -> Result<OrderRefund, SettlementError> {
        let (target, reference, failure_reason) = match outcome {
            GatewayOutcome::Completed { reference } => (RefundStatus::Completed, reference, None),
            GatewayOutcome::Failed { reason } => (RefundStatus::Failed, None, Some(reason)),
        };
        let mut tx = self.pool.begin().await?;
        let refund = refunds::fetch_existing_refund(refund_id, &mut tx).await?;
        if refund.status == target {
            debug!("💸️ Refund #{refund_id} is already {target}. Nothing to do.");
            return Ok(refund);
        }
        if !refund.status.can_transition_to(target) {
            return Err(SettlementError::invalid_transition(format!("Refund #{refund_id}"), refund.status, target));
        }
        let refund = refunds::update_status(refund_id, refund.status, target, reference, failure_reason, &mut tx).await?;
        if let Some(cancellation_id) = refund.cancellation_id {
            order_items::update_cancellation_refund_status(cancellation_id, target, &mut tx).await?;
        }
        if let (RefundStatus::Completed, Some(return_id)) = (target, refund.return_id) {
            let order_return = returns::fetch_existing_return(return_id, &mut tx).await?;
            if order_return.status == ReturnStatus::Approved {
                let notes = Some(format!("Refund #{refund_id} completed"));
                let system = Actor::system();
                returns::transition(return_id, ReturnStatus::Approved, ReturnStatus::Refunded, &system, None, notes, &mut tx)
                    .await?;
            }
        }
        tx.commit().await?;
        info!("💸️ Refund #{refund_id} is now {target}");
        Ok(refund)
    }

    async fn fetch_refund(&self, refund_id: i64) -> Result<Option<OrderRefund>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::fetch_refund(refund_id, &mut conn).await?;
        Ok(refund)
    }

    async fn fetch_refund_by_key(&self, idempotency_key: &str) -> Result<Option<OrderRefund>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let refund = refunds::fetch_refund_by_key(idempotency_key, &mut conn).await?;
        Ok(refund)
    }

    async fn fetch_refunds_for_item(&self, order_item_id: i64) -> Result<Vec<OrderRefund>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let result = refunds::fetch_refunds_for_item(order_item_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_refunds_with_status(&self, status: RefundStatus) -> Result<Vec<OrderRefund>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let result = refunds::fetch_refunds_with_status(status, &mut conn).await?;
        Ok(result)
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn fetch_seller_balance(&self, seller_id: &SellerId) -> Result<Option<SellerBalance>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let balance = ledger::fetch_balance(seller_id, &mut conn).await?;
        Ok(balance)
    }

    async fn fetch_ledger(&self, seller_id: &SellerId) -> Result<Vec<BalanceTransaction>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let txs = ledger::fetch_transactions(seller_id, &mut conn).await?;
        Ok(txs)
    }
}

impl PayoutManagement for SqliteDatabase {
    /// Takes one snapshot of everything the payout needs inside a single transaction, so a refund that commits while
    /// the payout is being built is either fully in the snapshot or fully outside it:
    /// * the pending-settlement records whose hold has elapsed at `as_of`,
    /// * the carry-forward ledger debits no live payout has deducted yet,
    /// * the negative net amount of the last paid payout, if no live payout carries it already.
    ///
    /// Holds on records that have not been released before are released (pending to available balance).
    async fn generate_payout(
        &self,
        seller_id: &SellerId,
        period: PayoutPeriod,
        as_of: DateTime<Utc>,
    ) -> Result<PayoutGenerationResult, SettlementError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = payouts::fetch_active_payout_for_period(seller_id, period, &mut tx).await? {
            debug!("🏦️ Payout #{} already covers {period} for seller {seller_id}", existing.id);
            return Ok(PayoutGenerationResult::AlreadyExists(existing));
        }
        let records = past_hold(payouts::fetch_unsettled_records(seller_id, &mut tx).await?, as_of);
        if records.is_empty() {
            debug!("🏦️ Seller {seller_id} has nothing to settle for {period}");
            return Ok(PayoutGenerationResult::NothingToSettle);
        }
        let debits = ledger::fetch_undeducted_debits(seller_id, &mut tx).await?;
        let deductions: Vec<Deduction> = debits.iter().map(Deduction::from).collect();
        let carried_from = payouts::fetch_carry_in(seller_id, &mut tx).await?;
        let carry_in = carried_from.as_ref().map(|p| p.net_amount).unwrap_or(Paise::ZERO);
        let totals = PayoutTotals::compute(&records, &deductions, carry_in, Paise::ZERO);

        let payout = payouts::insert_payout(seller_id, period, &totals, carried_from.map(|p| p.id), &mut tx).await?;
        for record in &records {
            payouts::insert_snapshot(payout.id, record, &mut tx).await?;
        }
        for debit in &debits {
            payouts::insert_deduction(payout.id, debit, &mut tx).await?;
        }
        let (to_release, release_amount) = records
            .iter()
            .filter(|r| !r.is_released)
            .fold((Vec::new(), Paise::ZERO), |(mut ids, total), r| {
                ids.push(r.id);
                (ids, total + r.item_subtotal)
            });
        if !to_release.is_empty() {
            ledger::release_hold(seller_id, release_amount, &mut tx).await?;
            payouts::mark_released(&to_release, &mut tx).await?;
        }
        let notes = Some(format!("Generated for {period} with {} items", totals.item_count));
        let system = Actor::system();
        payouts::insert_approval_log(payout.id, "generated", None, PayoutStatus::Pending, &system, notes, None, &mut tx)
            .await?;
        tx.commit().await?;
        info!(
            "🏦️ Payout #{} generated for seller {seller_id} ({period}): {} items, net {}",
            payout.id, totals.item_count, totals.net_amount
        );
        if totals.net_amount.is_negative() {
            warn!("🏦️ Payout #{} has a negative net amount of {}. It needs an admin decision.", payout.id, totals.net_amount);
        }
        Ok(PayoutGenerationResult::Inserted(payout))
    }

    async fn fetch_sellers_with_unsettled_items(&self) -> Result<Vec<SellerId>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let sellers = payouts::fetch_sellers_with_unsettled_items(&mut conn).await?;
        Ok(sellers)
    }

    async fn approve_payout(
        &self,
        payout_id: i64,
        admin: &Actor,
        balance_adjustment: Option<Paise>,
        admin_notes: Option<String>,
    ) -> Result<SellerPayout, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::fetch_existing_payout(payout_id, &mut tx).await?;
        check_payout_edge(&payout, PayoutStatus::Approved)?;
        let adjustment = balance_adjustment.unwrap_or(payout.balance_adjustment);
        let totals = payouts::recompute_totals(&payout, adjustment, &mut tx).await?;
        payouts::update_status(payout_id, payout.status, PayoutStatus::Approved, &mut tx).await?;
        payouts::update_totals(payout_id, &totals, &mut tx).await?;
        payouts::set_approval(payout_id, admin, admin_notes.clone(), &mut tx).await?;
        payouts::insert_approval_log(
            payout_id,
            "approved",
            Some(payout.status),
            PayoutStatus::Approved,
            admin,
            admin_notes,
            None,
            &mut tx,
        )
        .await?;
        let payout = payouts::fetch_existing_payout(payout_id, &mut tx).await?;
        tx.commit().await?;
        info!("🏦️ Payout #{payout_id} approved by {admin}. Net amount {}", payout.net_amount);
        Ok(payout)
    }

    async fn reject_payout(&self, payout_id: i64, admin: &Actor, reason: &str) -> Result<SellerPayout, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::fetch_existing_payout(payout_id, &mut tx).await?;
        check_payout_edge(&payout, PayoutStatus::Rejected)?;
        payouts::update_status(payout_id, payout.status, PayoutStatus::Rejected, &mut tx).await?;
        payouts::set_rejection(payout_id, reason, &mut tx).await?;
        payouts::insert_approval_log(
            payout_id,
            "rejected",
            Some(payout.status),
            PayoutStatus::Rejected,
            admin,
            Some(reason.to_string()),
            None,
            &mut tx,
        )
        .await?;
        let payout = payouts::fetch_existing_payout(payout_id, &mut tx).await?;
        tx.commit().await?;
        info!("🏦️ Payout #{payout_id} rejected by {admin}. Its items are eligible for the next run.");
        Ok(payout)
    }

    /// In a single atomic transaction,
    /// * recomputes the totals so that items refunded since approval are left out,
    /// * posts the fee, tax and manual adjustment to the ledger as one payout-linked `balance_adjustment`, which is
    ///   settled against the available balance,
    /// * debits the net amount (if positive) as a `payout_debit`,
    /// * records the payment and settles the payout's items.
    async fn mark_payout_paid(
        &self,
        payout_id: i64,
        admin: &Actor,
        payment_method: &str,
        payment_reference: &str,
        disbursement: DisbursementStatus,
    ) -> Result<SellerPayout, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::fetch_existing_payout(payout_id, &mut tx).await?;
        check_payout_edge(&payout, PayoutStatus::Paid)?;
        payouts::update_status(payout_id, payout.status, PayoutStatus::Paid, &mut tx).await?;
        let totals = payouts::recompute_totals(&payout, payout.balance_adjustment, &mut tx).await?;
        if totals != PayoutTotals::from(&payout) {
            debug!("🏦️ Payout #{payout_id} totals changed since approval. Net is now {}", totals.net_amount);
        }
        payouts::update_totals(payout_id, &totals, &mut tx).await?;
        let seller = &payout.seller_id;
        let adjustment = totals.settlement_adjustment();
        if !adjustment.is_zero() {
            let entry = LedgerEntry::payout_settlement(payout_id, adjustment)
                .with_description(format!("Fees, tax and adjustments settled by payout #{payout_id}"));
            ledger::post_entry(seller, entry, &mut tx).await?;
        }
        if totals.net_amount.is_positive() {
            ledger::post_entry(seller, LedgerEntry::payout_debit(payout_id, totals.net_amount), &mut tx).await?;
        }
        let paid_at = Utc::now();
        ledger::record_last_payout(seller, totals.net_amount.positive_part(), paid_at, &mut tx).await?;
        payouts::set_payment(payout_id, admin, payment_method, payment_reference, disbursement, paid_at, &mut tx)
            .await?;
        let settled = payouts::settle_items(payout_id, &mut tx).await?;
        payouts::insert_approval_log(
            payout_id,
            "paid",
            Some(payout.status),
            PayoutStatus::Paid,
            admin,
            None,
            Some(payment_reference.to_string()),
            &mut tx,
        )
        .await?;
        let payout = payouts::fetch_existing_payout(payout_id, &mut tx).await?;
        tx.commit().await?;
        info!(
            "🏦️ Payout #{payout_id} paid by {admin} via {payment_method} ({payment_reference}). {} to seller {seller}, {settled} \
             items settled",
            payout.net_amount
        );
        Ok(payout)
    }

    async fn update_disbursement_status(
        &self,
        payout_id: i64,
        expected: DisbursementStatus,
        target: DisbursementStatus,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<SellerPayout, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let payout = payouts::fetch_existing_payout(payout_id, &mut tx).await?;
        if payout.status != PayoutStatus::Paid {
            return Err(SettlementError::invalid_transition(
                format!("Disbursement of payout #{payout_id}"),
                payout.status,
                target,
            ));
        }
        let updated = payouts::update_disbursement(payout_id, expected, target, reference.clone(), &mut tx)
            .await?
            .ok_or_else(|| SettlementError::Conflict(format!("Disbursement of payout #{payout_id}")))?;
        payouts::insert_approval_log(
            payout_id,
            &format!("disbursement_{target}"),
            Some(PayoutStatus::Paid),
            PayoutStatus::Paid,
            &Actor::system(),
            notes,
            reference,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        debug!("🏦️ Disbursement of payout #{payout_id}: {expected} -> {target}");
        Ok(updated)
    }

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<SellerPayout>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let payout = payouts::fetch_payout(payout_id, &mut conn).await?;
        Ok(payout)
    }

    async fn fetch_payouts_for_seller(&self, seller_id: &SellerId) -> Result<Vec<SellerPayout>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let result = payouts::fetch_payouts_for_seller(seller_id, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_payouts_with_disbursement_status(
        &self,
        status: DisbursementStatus,
    ) -> Result<Vec<SellerPayout>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let result = payouts::fetch_payouts_with_disbursement_status(status, &mut conn).await?;
        Ok(result)
    }

    async fn fetch_payout_items(&self, payout_id: i64) -> Result<Vec<PayoutItem>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let items = payouts::fetch_payout_items(payout_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_payout_deductions(&self, payout_id: i64) -> Result<Vec<PayoutDeduction>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let deductions = payouts::fetch_deductions(payout_id, &mut conn).await?;
        Ok(deductions)
    }

    async fn fetch_approval_logs(&self, payout_id: i64) -> Result<Vec<PayoutApprovalLog>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let logs = payouts::fetch_approval_logs(payout_id, &mut conn).await?;
        Ok(logs)
    }

    async fn fetch_settlement_records(&self, seller_id: &SellerId) -> Result<Vec<PayoutItem>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let records = payouts::fetch_settlement_records(seller_id, &mut conn).await?;
        Ok(records)
    }
}

fn check_payout_edge(payout: &SellerPayout, target: PayoutStatus) -> Result<(), SettlementError> {
    if payout.status.can_transition_to(target) {
        Ok(())
    } else {
        Err(SettlementError::invalid_transition(format!("Payout #{}", payout.id), payout.status, target))
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date. Safe to call on every start.
    pub async fn run_migrations(&self) -> Result<(), MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("Database migrations are up to date");
        Ok(())
    }
}

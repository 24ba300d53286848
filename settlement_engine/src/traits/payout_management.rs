use chrono::{DateTime, Utc};

use crate::{
    db_types::{
        Actor,
        DisbursementStatus,
        Paise,
        PayoutApprovalLog,
        PayoutDeduction,
        PayoutItem,
        PayoutPeriod,
        SellerId,
        SellerPayout,
    },
    traits::{data_objects::PayoutGenerationResult, SettlementError},
};

/// Storage for payout batch generation and the approval workflow.
#[allow(async_fn_in_trait)]
pub trait PayoutManagement {
    /// Builds a `pending` payout for the seller and period from a single snapshot of the eligible items, and releases
    /// their holds (pending to available balance), atomically.
    async fn generate_payout(
        &self,
        seller_id: &SellerId,
        period: PayoutPeriod,
        as_of: DateTime<Utc>,
    ) -> Result<PayoutGenerationResult, SettlementError>;

    /// Sellers that have delivered items that have not been settled or refunded yet.
    async fn fetch_sellers_with_unsettled_items(&self) -> Result<Vec<SellerId>, SettlementError>;

    /// `pending -> approved`. Totals are recomputed with refunded items excluded.
    async fn approve_payout(
        &self,
        payout_id: i64,
        admin: &Actor,
        balance_adjustment: Option<Paise>,
        admin_notes: Option<String>,
    ) -> Result<SellerPayout, SettlementError>;

    /// `pending -> rejected`. The payout's items become eligible again.
    async fn reject_payout(&self, payout_id: i64, admin: &Actor, reason: &str) -> Result<SellerPayout, SettlementError>;

    /// `approved -> paid`. Recomputes the totals, debits the ledger and settles the items and deductions, atomically.
    async fn mark_payout_paid(
        &self,
        payout_id: i64,
        admin: &Actor,
        payment_method: &str,
        payment_reference: &str,
        disbursement: DisbursementStatus,
    ) -> Result<SellerPayout, SettlementError>;

    /// Moves the disbursement status of a paid payout from `expected` to `target`, optionally replacing the payment
    /// reference with the one the gateway reported. Writes an approval log entry.
    async fn update_disbursement_status(
        &self,
        payout_id: i64,
        expected: DisbursementStatus,
        target: DisbursementStatus,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<SellerPayout, SettlementError>;

    async fn fetch_payout(&self, payout_id: i64) -> Result<Option<SellerPayout>, SettlementError>;

    async fn fetch_payouts_for_seller(&self, seller_id: &SellerId) -> Result<Vec<SellerPayout>, SettlementError>;

    /// Paid payouts whose disbursement is in the given state, oldest first.
    async fn fetch_payouts_with_disbursement_status(
        &self,
        status: DisbursementStatus,
    ) -> Result<Vec<SellerPayout>, SettlementError>;

    async fn fetch_payout_items(&self, payout_id: i64) -> Result<Vec<PayoutItem>, SettlementError>;

    async fn fetch_payout_deductions(&self, payout_id: i64) -> Result<Vec<PayoutDeduction>, SettlementError>;

    async fn fetch_approval_logs(&self, payout_id: i64) -> Result<Vec<PayoutApprovalLog>, SettlementError>;

    /// Pending-settlement records (one per delivered item) for the seller.
    async fn fetch_settlement_records(&self, seller_id: &SellerId) -> Result<Vec<PayoutItem>, SettlementError>;
}
